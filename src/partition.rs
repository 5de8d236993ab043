//! Hardware partitioning: neurons into core-sized chunks, weights into
//! synapse-bounded connection chunks.
//!
//! ## Core assignment
//!
//! Chunks are placed sequentially on consecutive logical cores, chip-major:
//! logical core `n` is core `n % cores_per_chip` of chip `n / cores_per_chip`.
//! Callers that place several populations pass the first free core.
//!
//! ## Connection ordering
//!
//! Connection chunks are emitted by source chunk, then target chunk, then
//! split part. Inside one chunk, synapses are ordered by target, then source.

use log::{debug, warn};

use crate::config::ConstraintSet;
use crate::error::{ConstraintViolation, LayoutError, Result};
use crate::population::{Block, Population};
use crate::weights::WeightMatrix;

/// Physical location of a core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CoreId {
    pub chip: usize,
    pub core: usize,
    /// `chip * cores_per_chip + core`
    pub logical: usize,
}

/// Chip and core counts of the target hardware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HardwareTopology {
    pub num_chips: usize,
    pub num_cores_per_chip: usize,
}

impl HardwareTopology {
    pub fn from_constraints(c: &ConstraintSet) -> Self {
        Self {
            num_chips: c.num_chips,
            num_cores_per_chip: c.num_cores_per_chip,
        }
    }

    #[inline]
    pub fn available_cores(&self) -> usize {
        self.num_chips * self.num_cores_per_chip
    }

    /// Core at a logical index, if the hardware has it.
    pub fn core(&self, logical: usize) -> Option<CoreId> {
        if logical >= self.available_cores() {
            return None;
        }
        Some(CoreId {
            chip: logical / self.num_cores_per_chip,
            core: logical % self.num_cores_per_chip,
            logical,
        })
    }
}

/// A core-sized group of neurons from one population.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Position in its population's chunk sequence.
    pub index: usize,
    pub population: Population,
    pub core: CoreId,
    /// Population-local neuron indices, ascending.
    compartments: Vec<u32>,
}

impl Chunk {
    pub fn new(index: usize, population: Population, core: CoreId, mut compartments: Vec<u32>) -> Self {
        compartments.sort_unstable();
        compartments.dedup();
        Self { index, population, core, compartments }
    }

    #[inline]
    pub fn compartments(&self) -> &[u32] {
        &self.compartments
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.compartments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.compartments.is_empty()
    }

    /// Lowest neuron index in the chunk.
    pub fn first(&self) -> Option<u32> {
        self.compartments.first().copied()
    }

    pub fn contains(&self, neuron: u32) -> bool {
        self.compartments.binary_search(&neuron).is_ok()
    }

    /// Index of `neuron` within this chunk's compartment list.
    pub fn local_index(&self, neuron: u32) -> Option<usize> {
        self.compartments.binary_search(&neuron).ok()
    }
}

/// Split `total` neurons into contiguous chunks of at most `neurons_per_core`,
/// placed from logical core 0.
pub fn partition_neurons(
    population: Population,
    total: usize,
    neurons_per_core: usize,
    num_chips: usize,
    num_cores_per_chip: usize,
) -> Result<Vec<Chunk>> {
    let topology = HardwareTopology { num_chips, num_cores_per_chip };
    partition_neurons_from(population, total, neurons_per_core, &topology, 0)
}

/// Split `total` neurons into contiguous chunks placed on consecutive cores
/// starting at logical core `first_core`.
pub fn partition_neurons_from(
    population: Population,
    total: usize,
    neurons_per_core: usize,
    topology: &HardwareTopology,
    first_core: usize,
) -> Result<Vec<Chunk>> {
    if neurons_per_core == 0 {
        return Err(ConstraintViolation::ZeroNeuronsPerCore.into());
    }

    let groups = total.div_ceil(neurons_per_core);
    let required = first_core + groups;
    let available = topology.available_cores();
    if groups > 0 && required > available {
        return Err(LayoutError::CoreCapacityExceeded { required, available });
    }

    let chunks: Vec<Chunk> = (0..groups)
        .map(|g| {
            let start = g * neurons_per_core;
            let end = (start + neurons_per_core).min(total);
            // In range: required <= available was checked above
            let core = CoreId {
                chip: (first_core + g) / topology.num_cores_per_chip,
                core: (first_core + g) % topology.num_cores_per_chip,
                logical: first_core + g,
            };
            Chunk::new(g, population, core, (start as u32..end as u32).collect())
        })
        .collect();

    debug!(
        "partitioned {} {} neurons into {} chunks on cores {}..{}",
        total, population, chunks.len(), first_core, required
    );
    Ok(chunks)
}

/// One synapse inside a connection chunk, in population-local indices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SynapseEntry {
    pub source: u32,
    pub target: u32,
    pub weight: f32,
}

/// A bounded group of synapses between one source chunk and one target chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionChunk {
    pub block: Block,
    /// Index of the source chunk in its population's sequence.
    pub source_chunk: usize,
    /// Index of the target chunk in its population's sequence.
    pub target_chunk: usize,
    /// Split piece number, 0-based, for pairs over the synapse limit.
    pub part: usize,
    pub source_core: CoreId,
    pub target_core: CoreId,
    pub entries: Vec<SynapseEntry>,
}

impl ConnectionChunk {
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Package every non-zero weight of `weights` into connection chunks, never
/// more than `max_synapses_per_core` synapses each.
///
/// Every non-zero entry lands in exactly one connection chunk. Chunk pairs
/// with no synapses produce nothing.
pub fn partition_connections(
    block: Block,
    weights: &WeightMatrix,
    source_chunks: &[Chunk],
    target_chunks: &[Chunk],
    max_synapses_per_core: usize,
) -> Result<Vec<ConnectionChunk>> {
    if max_synapses_per_core == 0 {
        return Err(LayoutError::ZeroSynapseLimit);
    }

    let source_owner = owner_table(block, "source", weights.rows(), source_chunks)?;
    let target_owner = owner_table(block, "target", weights.cols(), target_chunks)?;

    // grid[s][t] collects the synapses from source chunk s to target chunk t
    let n_src = source_chunks.len();
    let n_tgt = target_chunks.len();
    let mut grid: Vec<Vec<Vec<SynapseEntry>>> = vec![vec![Vec::new(); n_tgt]; n_src];

    for (row, col, weight) in weights.nonzero() {
        match (source_owner[row], target_owner[col]) {
            (Some(s), Some(t)) => grid[s][t].push(SynapseEntry {
                source: row as u32,
                target: col as u32,
                weight,
            }),
            _ => return Err(LayoutError::UncoveredEntry { block, row, col }),
        }
    }

    let mut out = Vec::new();
    for (s, row) in grid.into_iter().enumerate() {
        for (t, entries) in row.into_iter().enumerate() {
            if entries.is_empty() {
                continue;
            }
            let src = &source_chunks[s];
            let tgt = &target_chunks[t];
            if entries.len() > max_synapses_per_core {
                warn!(
                    "{} chunk pair ({}, {}) holds {} synapses, splitting at {}",
                    block, src.index, tgt.index, entries.len(), max_synapses_per_core
                );
            }
            for (part, piece) in entries.chunks(max_synapses_per_core).enumerate() {
                out.push(ConnectionChunk {
                    block,
                    source_chunk: src.index,
                    target_chunk: tgt.index,
                    part,
                    source_core: src.core,
                    target_core: tgt.core,
                    entries: piece.to_vec(),
                });
            }
        }
    }

    debug!("{}: {} connection chunks from {} synapses", block, out.len(), weights.nnz_nonzero());
    Ok(out)
}

/// Map each neuron index to the position of the chunk that holds it.
fn owner_table(block: Block, side: &str, size: usize, chunks: &[Chunk]) -> Result<Vec<Option<usize>>> {
    let mut owner = vec![None; size];
    for (pos, chunk) in chunks.iter().enumerate() {
        for &n in chunk.compartments() {
            let n = n as usize;
            if n >= size {
                return Err(LayoutError::PatternMismatch {
                    block,
                    reason: format!("{side} chunk {} holds neuron {n}, matrix has {size}", chunk.index),
                });
            }
            if owner[n].is_some() {
                return Err(LayoutError::PatternMismatch {
                    block,
                    reason: format!("{side} neuron {n} belongs to more than one chunk"),
                });
            }
            owner[n] = Some(pos);
        }
    }
    Ok(owner)
}
