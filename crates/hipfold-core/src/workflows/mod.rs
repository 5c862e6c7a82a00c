//! # Workflows Module
//!
//! End-to-end procedures built from the engine.
//!
//! - **Fold Workflow** ([`fold`]) - Optional ideal-geometry refresh of the
//!   restraints, hierarchic projection, dimension squeezing and tangle
//!   elimination.

pub mod fold;
