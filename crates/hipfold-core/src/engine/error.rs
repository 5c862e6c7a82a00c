use thiserror::Error;

use super::config::ConfigError;
use crate::core::linalg::LinalgError;
use crate::core::models::cluster::ClusterError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Invalid cluster layout: {source}")]
    Cluster {
        #[from]
        source: ClusterError,
    },

    #[error("Numerical failure during '{phase}': {source}")]
    Numerical {
        phase: &'static str,
        source: LinalgError,
    },
}

impl EngineError {
    pub(crate) fn numerical(phase: &'static str) -> impl FnOnce(LinalgError) -> Self {
        move |source| EngineError::Numerical { phase, source }
    }
}
