//! # hipfold Core Library
//!
//! Folds a polymer chain into Cartesian coordinates from an incomplete, noisy
//! matrix of squared inter-residue distances, and removes knots in which the
//! chain threads through helix or sheet segments.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`PointSet`,
//!   `ClusterLayout`, `Segment`), metric conversion and triangle-inequality
//!   smoothing, and the dense linear-algebra primitives built on `nalgebra`.
//!
//! - **[`engine`]: The Logic Core.** Hierarchic inertial projection
//!   (`full_project`) and the tangle detection/elimination state machine,
//!   together with configuration, progress reporting and errors.
//!
//! - **[`workflows`]: The Public API.** Ties the engine together into the
//!   complete fold pipeline used by the command-line driver.

pub mod core;
pub mod engine;
pub mod workflows;
