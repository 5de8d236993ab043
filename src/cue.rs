//! Cue input wiring: spike generators driving a patch of reservoir neurons.
//!
//! The cue patch is the first `cue_patch_neurons` reservoir neurons in
//! global order, excitatory first, so a patch larger than the excitatory
//! population spills into the inhibitory one. Generators do not occupy
//! cores, so cue synapses are chunked by target chunk only.

use log::debug;

use crate::config::{CueParams, NetworkParams};
use crate::error::{LayoutError, Result};
use crate::mask::{generate_mask, Mask};
use crate::network::{stream_rng, NetworkLayout, Stream, CUE_LANE};
use crate::partition::{Chunk, CoreId, SynapseEntry};
use crate::population::Population;
use crate::weights::{draw_values, WeightMatrix};

/// A bounded group of cue synapses onto one target chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct CueChunk {
    pub population: Population,
    /// Index of the target chunk in its population's sequence.
    pub target_chunk: usize,
    /// Split piece number, 0-based.
    pub part: usize,
    pub target_core: CoreId,
    /// `source` is the generator, `target` the population-local neuron.
    pub entries: Vec<SynapseEntry>,
}

impl CueChunk {
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cue weights (generators × patch neurons) and their chunks.
#[derive(Clone, Debug, PartialEq)]
pub struct CueWiring {
    weights: WeightMatrix,
    chunks: Vec<CueChunk>,
}

impl CueWiring {
    #[inline]
    pub fn mask(&self) -> &Mask {
        self.weights.mask()
    }

    #[inline]
    pub fn weights(&self) -> &WeightMatrix {
        &self.weights
    }

    #[inline]
    pub fn chunks(&self) -> &[CueChunk] {
        &self.chunks
    }

    pub fn generators(&self) -> usize {
        self.weights.rows()
    }

    pub fn patch_size(&self) -> usize {
        self.weights.cols()
    }

    pub fn n_synapses(&self) -> usize {
        self.weights.nnz_nonzero()
    }
}

/// Draw the cue mask and its positive weights for a patch of `patch` neurons.
pub fn generate_cue_weights(patch: usize, params: &CueParams, seed: u64) -> Result<WeightMatrix> {
    if !params.coefficient.is_finite() || params.coefficient < 0.0 {
        return Err(LayoutError::InvalidCue {
            reason: format!("coefficient must be finite and >= 0, got {}", params.coefficient),
        });
    }

    let mask = generate_mask(
        params.generators,
        patch,
        params.in_degree,
        false,
        &mut stream_rng(seed, CUE_LANE, Stream::Mask),
    )?;
    let scale = Population::Excitatory.sign() * params.coefficient;
    let values = draw_values(&mask, &params.distribution, scale, &mut stream_rng(seed, CUE_LANE, Stream::Weights))
        .map_err(|reason| LayoutError::InvalidCue { reason })?;
    WeightMatrix::from_parts(mask, values).map_err(|reason| LayoutError::InvalidCue { reason })
}

/// Package every non-zero cue weight into chunks of at most
/// `max_synapses_per_core` synapses, excitatory target chunks first.
pub fn partition_cue(
    weights: &WeightMatrix,
    reservoir_ex_size: usize,
    ex_chunks: &[Chunk],
    in_chunks: &[Chunk],
    max_synapses_per_core: usize,
) -> Result<Vec<CueChunk>> {
    if max_synapses_per_core == 0 {
        return Err(LayoutError::ZeroSynapseLimit);
    }

    // Buckets: ex chunks at 0.., in chunks after them
    let targets: Vec<&Chunk> = ex_chunks.iter().chain(in_chunks).collect();
    let mut owner: Vec<Option<usize>> = vec![None; weights.cols()];
    for (pos, chunk) in targets.iter().enumerate() {
        let offset = match chunk.population {
            Population::Excitatory => 0,
            Population::Inhibitory => reservoir_ex_size,
        };
        for &n in chunk.compartments() {
            let global = offset + n as usize;
            if global < owner.len() {
                owner[global] = Some(pos);
            }
        }
    }

    let mut buckets: Vec<Vec<SynapseEntry>> = vec![Vec::new(); targets.len()];
    for (row, col, weight) in weights.nonzero() {
        let Some(pos) = owner[col] else {
            return Err(LayoutError::InvalidCue {
                reason: format!("patch neuron {col} is not in any chunk"),
            });
        };
        let local = if col < reservoir_ex_size { col } else { col - reservoir_ex_size };
        buckets[pos].push(SynapseEntry {
            source: row as u32,
            target: local as u32,
            weight,
        });
    }

    let mut out = Vec::new();
    for (chunk, entries) in targets.iter().zip(buckets) {
        for (part, piece) in entries.chunks(max_synapses_per_core).enumerate() {
            out.push(CueChunk {
                population: chunk.population,
                target_chunk: chunk.index,
                part,
                target_core: chunk.core,
                entries: piece.to_vec(),
            });
        }
    }

    debug!("cue: {} chunks from {} synapses", out.len(), weights.nnz_nonzero());
    Ok(out)
}

impl NetworkLayout {
    /// Wire the cue generators onto this layout's cue patch.
    pub fn cue_wiring(&self, params: &CueParams, seed: u64) -> Result<CueWiring> {
        let c = self.constraints();
        let weights = generate_cue_weights(c.cue_patch_neurons, params, seed)?;
        let chunks = partition_cue(
            &weights,
            c.reservoir_ex_size,
            self.ex_chunks(),
            self.in_chunks(),
            c.max_synapses_per_core,
        )?;
        debug!(
            "cue: {} generators onto {} neurons, {} synapses",
            weights.rows(),
            weights.cols(),
            weights.nnz_nonzero()
        );
        Ok(CueWiring { weights, chunks })
    }
}

impl NetworkParams {
    /// Cue wiring for a layout built from these parameters.
    pub fn cue_wiring(&self, layout: &NetworkLayout) -> Result<CueWiring> {
        layout.cue_wiring(&self.cue, self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConstraintSet, WeightDistribution};
    use crate::network::build;
    use crate::population::Block;
    use std::collections::BTreeSet;

    fn constraints(cue: usize) -> ConstraintSet {
        ConstraintSet {
            num_chips: 1,
            num_cores_per_chip: 8,
            neurons_per_core: 10,
            reservoir_ex_size: 20,
            reservoir_in_size: 20,
            num_connections_per_neuron: 6,
            cue_patch_neurons: cue,
            max_synapses_per_core: 100,
        }
    }

    #[test]
    fn patch_neurons_get_fixed_cue_in_degree() {
        let layout = build(&constraints(12), 42).unwrap();
        let cue = layout.cue_wiring(&CueParams::default(), 42).unwrap();

        assert_eq!(cue.generators(), 20);
        assert_eq!(cue.patch_size(), 12);
        assert!((0..12).all(|col| cue.mask().in_degree(col) == 4));
        assert!(cue.weights().values().iter().all(|&v| v > 0.0));
        assert_eq!(cue.n_synapses(), 12 * 4);
    }

    #[test]
    fn every_cue_synapse_lands_in_one_chunk() {
        let layout = build(&constraints(12), 42).unwrap();
        let cue = layout.cue_wiring(&CueParams::default(), 1).unwrap();

        // Patch 0..12 covers ex chunk 0 (0..10) and ex chunk 1 (10..12)
        assert_eq!(cue.chunks().len(), 2);
        let mut seen = BTreeSet::new();
        for chunk in cue.chunks() {
            assert_eq!(chunk.population, Population::Excitatory);
            let target = &layout.ex_chunks()[chunk.target_chunk];
            assert_eq!(chunk.target_core, target.core);
            for e in &chunk.entries {
                assert!(target.contains(e.target));
                assert!(seen.insert((e.source, e.target)));
            }
        }
        let expected: BTreeSet<(u32, u32)> = cue.weights().nonzero().map(|(r, c, _)| (r as u32, c as u32)).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn patch_spills_into_inhibitory_population() {
        let layout = build(&constraints(25), 42).unwrap();
        let cue = layout.cue_wiring(&CueParams::default(), 42).unwrap();

        let inh: Vec<&CueChunk> = cue.chunks().iter().filter(|c| c.population == Population::Inhibitory).collect();
        assert_eq!(inh.len(), 1);
        assert_eq!(inh[0].target_core, layout.in_chunks()[0].core);
        // Global patch neurons 20..25 are inhibitory neurons 0..5
        let targets: BTreeSet<u32> = inh[0].entries.iter().map(|e| e.target).collect();
        assert_eq!(targets, (0..5).collect::<BTreeSet<u32>>());
    }

    #[test]
    fn oversized_pairs_are_split() {
        let weights = generate_cue_weights(10, &CueParams::default(), 3).unwrap();
        let layout = build(&constraints(10), 3).unwrap();
        let chunks = partition_cue(&weights, 20, layout.ex_chunks(), layout.in_chunks(), 15).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(|c| c.part).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(chunks.iter().all(|c| c.len() <= 15));
        assert_eq!(chunks.iter().map(CueChunk::len).sum::<usize>(), 40);
    }

    #[test]
    fn cue_is_deterministic_and_leaves_reservoir_alone() {
        let layout = build(&constraints(12), 9).unwrap();
        let a = layout.cue_wiring(&CueParams::default(), 9).unwrap();
        let b = layout.cue_wiring(&CueParams::default(), 9).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, layout.cue_wiring(&CueParams::default(), 10).unwrap());
        assert_eq!(layout.weight_set(), build(&constraints(12), 9).unwrap().weight_set());
        assert!(layout.connection_chunks().iter().all(|c| Block::ALL.contains(&c.block)));
    }

    #[test]
    fn empty_patch_has_no_chunks() {
        let layout = build(&constraints(0), 42).unwrap();
        let cue = layout.cue_wiring(&CueParams::default(), 42).unwrap();
        assert_eq!(cue.n_synapses(), 0);
        assert!(cue.chunks().is_empty());
    }

    #[test]
    fn infeasible_cue_in_degree_rejected() {
        let params = CueParams { generators: 3, in_degree: 4, ..CueParams::default() };
        let err = generate_cue_weights(10, &params, 42).unwrap_err();
        assert_eq!(err, LayoutError::InfeasibleDegree { requested: 4, available: 3 });
    }

    #[test]
    fn invalid_cue_parameters_rejected() {
        let params = CueParams { coefficient: -1.0, ..CueParams::default() };
        assert!(matches!(generate_cue_weights(10, &params, 42), Err(LayoutError::InvalidCue { .. })));

        let params = CueParams {
            distribution: WeightDistribution::HalfNormal { sigma: -1.0 },
            ..CueParams::default()
        };
        assert!(matches!(generate_cue_weights(10, &params, 42), Err(LayoutError::InvalidCue { .. })));
    }
}
