//! # Core Module
//!
//! Stateless building blocks of the fold engine: the chain point set and its
//! cluster partition, secondary-structure segments, the dense linear-algebra
//! capabilities, and the conversions between squared-distance and metric
//! (Gram) matrices including triangle-inequality smoothing.
//!
//! - **Models** ([`models`]) - point sets with explicit views, cluster masks and layouts, segments
//! - **Linear Algebra** ([`linalg`]) - eigen-decomposition, SVD, optimal rotation fitting
//! - **Metric Conversion** ([`metric`]) - distance/Gram conversion and smoothing
//! - **Utilities** ([`utils`]) - safe numerics and small geometry helpers

pub mod linalg;
pub mod metric;
pub mod models;
pub mod utils;
