//! # Engine Module
//!
//! The stateful layer of hipfold. It turns squared-distance restraints into
//! coordinates and then removes unphysical threading of the chain through
//! secondary-structure elements.
//!
//! ## Architecture
//!
//! - **Projection** ([`projection`]) - Hierarchic inertial projection: local
//!   embedding of every cluster, skeleton embedding of centroids and inertial
//!   satellites, and rigid-body reconstruction with mirror resolution
//! - **Tangle Engine** ([`tangle`]) - Tetrahedron-piercing detection and the
//!   detect/adjust loop that separates entangled clusters
//! - **Configuration** ([`config`]) - Builders for projection, tangle and fold
//!   parameters
//! - **Progress Monitoring** ([`progress`]) - Callback-based phase and task
//!   reporting
//! - **Error Handling** ([`error`]) - Engine-level error type
//!
//! Numerical trouble confined to a single cluster or tetrahedron is logged and
//! recorded in the returned reports rather than surfaced as an error.

pub mod config;
pub mod error;
pub mod progress;
pub mod projection;
pub mod tangle;
