//! Error taxonomy for reservoir construction.
//!
//! Every error here is a configuration error: nothing is retried and nothing
//! is recovered locally. A failed build never yields a partial layout.

use std::path::PathBuf;

use thiserror::Error;

use crate::population::Block;

/// A rule of the constraint set that the configured numbers break.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConstraintViolation {
    #[error("connections per neuron exceed reservoir size: {requested} > {total}")]
    InDegreeExceedsReservoir { requested: usize, total: usize },
    #[error("cue patch exceeds reservoir size: {cue} > {total}")]
    CuePatchExceedsReservoir { cue: usize, total: usize },
    #[error("core capacity exceeded: required {required} cores > available {available}")]
    CoreCapacity { required: usize, available: usize },
    #[error("neurons per core must be non-zero")]
    ZeroNeuronsPerCore,
    #[error("synapses per core must be non-zero")]
    ZeroSynapsesPerCore,
}

/// Failure of any construction step.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LayoutError {
    #[error("invalid constraints: {0}")]
    Constraint(#[from] ConstraintViolation),
    #[error("infeasible in-degree: {requested} connections requested, {available} sources available")]
    InfeasibleDegree { requested: usize, available: usize },
    #[error("partition needs {required} cores, hardware provides {available}")]
    CoreCapacityExceeded { required: usize, available: usize },
    #[error("invalid weight distribution for {block}: {reason}")]
    InvalidDistribution { block: Block, reason: String },
    #[error("{block} shape mismatch: {reason}")]
    PatternMismatch { block: Block, reason: String },
    #[error("{block} entry ({row}, {col}) is not covered by any chunk pair")]
    UncoveredEntry { block: Block, row: usize, col: usize },
    #[error("synapse limit per core must be non-zero")]
    ZeroSynapseLimit,
    #[error("invalid cue wiring: {reason}")]
    InvalidCue { reason: String },
}

pub type Result<T> = std::result::Result<T, LayoutError>;

/// Failure to load a parameter file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_messages_cite_numbers() {
        let v = ConstraintViolation::InDegreeExceedsReservoir { requested: 200, total: 150 };
        assert!(v.to_string().contains("200 > 150"));

        let v = ConstraintViolation::CoreCapacity { required: 20, available: 10 };
        assert!(v.to_string().contains("required 20 cores > available 10"));
    }

    #[test]
    fn violation_converts_into_layout_error() {
        let err: LayoutError = ConstraintViolation::ZeroNeuronsPerCore.into();
        assert_eq!(err, LayoutError::Constraint(ConstraintViolation::ZeroNeuronsPerCore));
    }
}
