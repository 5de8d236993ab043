//! NetworkLayout: the assembled reservoir, ready for hardware submission.
//!
//! A build runs derive → validate → masks → weights → neuron chunks →
//! connection chunks, and returns either a complete layout or the first
//! error. Layouts are never mutated; every rebuild returns a new one.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{ConstraintSet, NetworkParams, WeightParams};
use crate::error::{LayoutError, Result};
use crate::mask::{generate_mask, Mask};
use crate::partition::{
    partition_connections, partition_neurons_from, Chunk, ConnectionChunk, HardwareTopology,
};
use crate::population::{Block, BlockSet, Population};
use crate::weights::{generate_block_weights, WeightMatrix};

/// Which random sub-stream of a block to open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stream {
    Mask = 1,
    Weights = 2,
}

/// Lane of the cue input wiring, after the four reservoir blocks.
pub(crate) const CUE_LANE: u64 = Block::ALL.len() as u64;

/// SplitMix64 finaliser.
fn splitmix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Independent generator for one (seed, lane, stream) triple.
///
/// Each component goes through its own mixing round, so seeds that differ
/// only in a few bits do not alias onto another lane's stream. A block's matrices do not depend on the order blocks are
/// built in, and weights can be redrawn without replaying mask generation.
pub(crate) fn stream_rng(seed: u64, lane: u64, stream: Stream) -> StdRng {
    StdRng::seed_from_u64(splitmix(splitmix(splitmix(seed) ^ lane) ^ stream as u64))
}

fn block_rng(seed: u64, block: Block, stream: Stream) -> StdRng {
    stream_rng(seed, block.ordinal() as u64, stream)
}

fn population_size(c: &ConstraintSet, population: Population) -> usize {
    match population {
        Population::Excitatory => c.reservoir_ex_size,
        Population::Inhibitory => c.reservoir_in_size,
    }
}

/// Draw the four connectivity masks.
pub fn generate_masks(constraints: &ConstraintSet, seed: u64) -> Result<BlockSet<Mask>> {
    let split = constraints.derived().in_degree;
    BlockSet::try_from_fn(|block| {
        let in_degree = match block.source() {
            Population::Excitatory => split.from_ex,
            Population::Inhibitory => split.from_in,
        };
        let mut rng = block_rng(seed, block, Stream::Mask);
        let mask = generate_mask(
            population_size(constraints, block.source()),
            population_size(constraints, block.target()),
            in_degree,
            block.excludes_self(),
            &mut rng,
        )?;
        debug!("{}: {}x{} mask, in-degree {}, {} entries", block, mask.rows(), mask.cols(), in_degree, mask.nnz());
        Ok(mask)
    })
}

/// Draw weights for existing masks.
pub fn generate_weight_set(masks: &BlockSet<&Mask>, params: &WeightParams, seed: u64) -> Result<BlockSet<WeightMatrix>> {
    BlockSet::try_from_fn(|block| {
        let mut rng = block_rng(seed, block, Stream::Weights);
        generate_block_weights(block, masks[block], params, &mut rng)
    })
}

/// Build a layout with default weight parameters.
pub fn build(constraints: &ConstraintSet, seed: u64) -> Result<NetworkLayout> {
    build_with(constraints, &WeightParams::default(), seed)
}

/// Build a layout. All-or-nothing: the first failing step aborts the build.
pub fn build_with(constraints: &ConstraintSet, params: &WeightParams, seed: u64) -> Result<NetworkLayout> {
    constraints.validate()?;
    let masks = generate_masks(constraints, seed)?;
    let weights = generate_weight_set(&BlockSet::from_fn(|b| &masks[b]), params, seed)?;
    NetworkLayout::assemble(constraints.clone(), weights)
}

impl NetworkParams {
    /// Build the layout these parameters describe.
    pub fn build(&self) -> Result<NetworkLayout> {
        build_with(&self.constraints, &self.weights, self.seed)
    }
}

/// Chunked reservoir: neuron chunks per population, weights per block, and
/// the connection chunks derived from them.
#[derive(Clone, Debug)]
pub struct NetworkLayout {
    constraints: ConstraintSet,
    ex_chunks: Vec<Chunk>,
    in_chunks: Vec<Chunk>,
    weights: BlockSet<WeightMatrix>,
    connection_chunks: Vec<ConnectionChunk>,
}

impl NetworkLayout {
    /// Rebuild chunks and connection chunks around existing weights, e.g. a
    /// snapshot loaded from disk.
    pub fn from_weights(constraints: ConstraintSet, weights: BlockSet<WeightMatrix>) -> Result<Self> {
        constraints.validate()?;
        for (block, w) in weights.iter() {
            let rows = population_size(&constraints, block.source());
            let cols = population_size(&constraints, block.target());
            if w.rows() != rows || w.cols() != cols {
                return Err(LayoutError::PatternMismatch {
                    block,
                    reason: format!("weights are {}x{}, reservoir needs {}x{}", w.rows(), w.cols(), rows, cols),
                });
            }
        }
        Self::assemble(constraints, weights)
    }

    fn assemble(constraints: ConstraintSet, weights: BlockSet<WeightMatrix>) -> Result<Self> {
        let topology = HardwareTopology::from_constraints(&constraints);
        let ex_chunks = partition_neurons_from(
            Population::Excitatory,
            constraints.reservoir_ex_size,
            constraints.neurons_per_core,
            &topology,
            0,
        )?;
        let in_chunks = partition_neurons_from(
            Population::Inhibitory,
            constraints.reservoir_in_size,
            constraints.neurons_per_core,
            &topology,
            ex_chunks.len(),
        )?;

        let mut connection_chunks = Vec::new();
        for block in Block::ALL {
            let sources = match block.source() {
                Population::Excitatory => &ex_chunks,
                Population::Inhibitory => &in_chunks,
            };
            let targets = match block.target() {
                Population::Excitatory => &ex_chunks,
                Population::Inhibitory => &in_chunks,
            };
            connection_chunks.extend(partition_connections(
                block,
                &weights[block],
                sources,
                targets,
                constraints.max_synapses_per_core,
            )?);
        }

        info!(
            "built reservoir: {} ex + {} in neurons on {} cores, {} synapses in {} connection chunks",
            constraints.reservoir_ex_size,
            constraints.reservoir_in_size,
            ex_chunks.len() + in_chunks.len(),
            weights.iter().map(|(_, w)| w.nnz_nonzero()).sum::<usize>(),
            connection_chunks.len()
        );

        Ok(Self { constraints, ex_chunks, in_chunks, weights, connection_chunks })
    }

    /// Same topology, weights redrawn from `params` with `seed`.
    pub fn redraw_weights(&self, params: &WeightParams, seed: u64) -> Result<Self> {
        let weights = generate_weight_set(&self.masks(), params, seed)?;
        Self::assemble(self.constraints.clone(), weights)
    }

    /// Replace one block's weights (e.g. after training) and re-partition.
    /// The new weights must sit on the block's existing mask.
    pub fn with_trained_weights(&self, block: Block, trained: WeightMatrix) -> Result<Self> {
        if trained.mask() != self.mask(block) {
            return Err(LayoutError::PatternMismatch {
                block,
                reason: "trained weights use a different connectivity mask".to_string(),
            });
        }
        let mut weights = self.weights.clone();
        weights[block] = trained;
        Self::assemble(self.constraints.clone(), weights)
    }

    #[inline]
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    #[inline]
    pub fn ex_chunks(&self) -> &[Chunk] {
        &self.ex_chunks
    }

    #[inline]
    pub fn in_chunks(&self) -> &[Chunk] {
        &self.in_chunks
    }

    pub fn chunks(&self, population: Population) -> &[Chunk] {
        match population {
            Population::Excitatory => &self.ex_chunks,
            Population::Inhibitory => &self.in_chunks,
        }
    }

    #[inline]
    pub fn mask(&self, block: Block) -> &Mask {
        self.weights[block].mask()
    }

    #[inline]
    pub fn weights(&self, block: Block) -> &WeightMatrix {
        &self.weights[block]
    }

    pub fn masks(&self) -> BlockSet<&Mask> {
        BlockSet::from_fn(|b| self.weights[b].mask())
    }

    #[inline]
    pub fn weight_set(&self) -> &BlockSet<WeightMatrix> {
        &self.weights
    }

    #[inline]
    pub fn connection_chunks(&self) -> &[ConnectionChunk] {
        &self.connection_chunks
    }

    pub fn connection_chunks_for(&self, block: Block) -> impl Iterator<Item = &ConnectionChunk> + '_ {
        self.connection_chunks.iter().filter(move |c| c.block == block)
    }
}
