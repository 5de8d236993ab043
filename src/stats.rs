//! Layout inspection and diagnostics.

use crate::network::NetworkLayout;
use crate::population::{Block, BlockSet};

/// Synapse summary for one block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockStats {
    pub rows: usize,
    pub cols: usize,
    pub n_synapses: usize,
    pub mean_weight_magnitude: f32,
    pub n_connection_chunks: usize,
}

impl std::fmt::Display for BlockStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}, {} synapses, mean |w| {:.3}, {} conn chunks",
            self.rows, self.cols, self.n_synapses, self.mean_weight_magnitude, self.n_connection_chunks
        )
    }
}

/// Summary statistics for a built layout.
#[derive(Clone, Debug)]
pub struct LayoutStats {
    pub n_excitatory: usize,
    pub n_inhibitory: usize,
    pub n_ex_chunks: usize,
    pub n_in_chunks: usize,
    pub cores_used: usize,
    pub cores_available: usize,
    pub chips_used: usize,
    pub n_synapses: usize,
    pub n_connection_chunks: usize,
    /// Synapses in the fullest connection chunk.
    pub largest_connection_chunk: usize,
    pub blocks: BlockSet<BlockStats>,
}

impl std::fmt::Display for LayoutStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Reservoir: {} neurons ({}E/{}I), {} synapses",
            self.n_excitatory + self.n_inhibitory, self.n_excitatory, self.n_inhibitory, self.n_synapses)?;
        writeln!(f, "  Chunks: {} ex + {} in on {}/{} cores ({} chips)",
            self.n_ex_chunks, self.n_in_chunks, self.cores_used, self.cores_available, self.chips_used)?;
        writeln!(f, "  Connection chunks: {} (largest {})",
            self.n_connection_chunks, self.largest_connection_chunk)?;
        for (block, stats) in self.blocks.iter() {
            writeln!(f, "  {block}: {stats}")?;
        }
        Ok(())
    }
}

impl NetworkLayout {
    /// Per-block synapse summary.
    pub fn block_stats(&self, block: Block) -> BlockStats {
        let w = self.weights(block);
        BlockStats {
            rows: w.rows(),
            cols: w.cols(),
            n_synapses: w.nnz_nonzero(),
            mean_weight_magnitude: w.mean_abs(),
            n_connection_chunks: self.connection_chunks_for(block).count(),
        }
    }

    /// Compute comprehensive layout statistics.
    pub fn stats(&self) -> LayoutStats {
        let blocks = BlockSet::from_fn(|b| self.block_stats(b));
        let cores_used = self.ex_chunks().len() + self.in_chunks().len();

        let mut chips: Vec<usize> = self.ex_chunks().iter()
            .chain(self.in_chunks())
            .map(|c| c.core.chip)
            .collect();
        chips.sort_unstable();
        chips.dedup();

        LayoutStats {
            n_excitatory: self.constraints().reservoir_ex_size,
            n_inhibitory: self.constraints().reservoir_in_size,
            n_ex_chunks: self.ex_chunks().len(),
            n_in_chunks: self.in_chunks().len(),
            cores_used,
            cores_available: self.constraints().available_cores(),
            chips_used: chips.len(),
            n_synapses: blocks.iter().map(|(_, s)| s.n_synapses).sum(),
            n_connection_chunks: self.connection_chunks().len(),
            largest_connection_chunk: self.connection_chunks().iter().map(|c| c.len()).max().unwrap_or(0),
            blocks,
        }
    }
}
