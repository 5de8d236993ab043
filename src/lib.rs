//! # reservoir-chunks
//!
//! Sparse excitatory/inhibitory reservoir construction for neuromorphic chips.
//!
//! Builds the four connectivity blocks of a Dale's-law reservoir (E→E, I→I,
//! I→E, E→I) with a fixed in-degree per neuron, draws signed weights for them,
//! and partitions both neurons and synapses into chunks that fit the per-core
//! limits of the target hardware. A cue input of spike generators can be
//! wired onto a patch of the reservoir and chunked the same way. Every build
//! is deterministic for a given seed and either returns a complete layout or
//! the first error.

pub mod codec;
pub mod config;
pub mod cue;
pub mod error;
pub mod mask;
pub mod network;
pub mod partition;
pub mod population;
pub mod stats;
pub mod weights;


pub use config::{validate, ConstraintSet, CueParams, DerivedParams, InDegreeSplit, NetworkParams, WeightDistribution, WeightParams};
pub use cue::{generate_cue_weights, partition_cue, CueChunk, CueWiring};
pub use error::{ConfigError, ConstraintViolation, LayoutError, Result};
pub use mask::{generate_mask, Mask};
pub use network::{build, build_with, generate_masks, generate_weight_set, NetworkLayout};
pub use partition::{partition_connections, partition_neurons, partition_neurons_from, Chunk, ConnectionChunk, CoreId, HardwareTopology, SynapseEntry};
pub use population::{Block, BlockSet, Population};
pub use stats::{BlockStats, LayoutStats};
pub use weights::{generate_block_weights, generate_weights, WeightMatrix};
