//! Dense linear-algebra capabilities used by the projection and tangle engines.
//!
//! The heavy lifting is delegated to `nalgebra`; this module fixes the
//! contracts the engine relies on: eigenvalues sorted in descending order, a
//! partial eigensolver that agrees with the full one, an SVD with explicit
//! rank truncation and least-squares solve, and a weighted optimal rotation
//! fit in arbitrary dimension that reports its handedness.

pub mod eigen;
pub mod rotation;
pub mod svd;

use thiserror::Error;

pub use eigen::{
    Eigen, SolverLimits, eigen_decompose, eigen_decompose_capped, eigen_partial, eigen_partial_capped,
};
pub use rotation::{RotationFit, best_rotation};
pub use svd::Svd;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Empty input")]
    Empty,

    #[error("Decomposition did not converge within {iterations} iterations")]
    NoConvergence { iterations: usize },
}
