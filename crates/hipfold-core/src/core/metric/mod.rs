//! Conversions between squared-distance matrices and centroid-based Gram
//! matrices, plus the triangle-inequality smoothing that makes noisy
//! distance estimates embeddable.

pub mod conversion;
pub mod smoothing;

pub use conversion::{CentreDistances, centre_dist, dist_metric, metric_dist};
pub use smoothing::{Balance, Smoothing, default_passes, trieq_bal, trineq_filter, trineq_filter_capped};
