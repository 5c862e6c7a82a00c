use super::spectral::{self, DimensionBounds};
use crate::core::linalg::LinalgError;
use crate::core::metric::{default_passes, trineq_filter_capped};
use crate::core::utils::geometry::{mean_abs_distance_error, squared_distance_matrix};
use crate::engine::config::ProjectionConfig;
use nalgebra::{DMatrix, DVector};
use tracing::debug;

/// Local embedding of one cluster.
#[derive(Debug, Clone)]
pub struct LocalFrame {
    pub cluster: usize,
    /// Chain positions of the members, ascending; row `i` of the local
    /// coordinates belongs to `members[i]`.
    pub members: Vec<usize>,
    /// Members by local axes.
    pub coords: DMatrix<f64>,
    /// Inertial moment (square root of the eigenvalue) of every local axis.
    pub moments: DVector<f64>,
    /// Squared distances recomputed from the local coordinates.
    pub local_sqdist: DMatrix<f64>,
    pub smoothing_passes: usize,
    /// Mean absolute distance error of the local coordinates against the
    /// input sub-matrix.
    pub distortion: f64,
}

impl LocalFrame {
    pub fn dimension(&self) -> usize {
        self.moments.len()
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn point(&self, row: usize) -> DVector<f64> {
        self.coords.row(row).transpose()
    }

    /// A zero-dimensional frame: every member sits on the cluster centroid.
    pub(crate) fn collapsed(cluster: usize, members: Vec<usize>) -> Self {
        let k = members.len();
        Self {
            cluster,
            members,
            coords: DMatrix::zeros(k, 0),
            moments: DVector::zeros(0),
            local_sqdist: DMatrix::zeros(k, k),
            smoothing_passes: 0,
            distortion: 0.0,
        }
    }
}

/// Embeds the cluster formed by `members` (ascending chain positions) into
/// its own principal frame.
///
/// The distance sub-matrix is smoothed, then embedded with between one and
/// `min(prior_dimension, members - 1)` axes. Single-member clusters are
/// zero-dimensional.
pub fn embed_cluster(
    cluster: usize,
    members: &[usize],
    distances: &DMatrix<f64>,
    config: &ProjectionConfig,
) -> Result<LocalFrame, LinalgError> {
    let k = members.len();
    if k == 0 {
        return Err(LinalgError::Empty);
    }
    if k == 1 {
        return Ok(LocalFrame::collapsed(cluster, members.to_vec()));
    }

    let sub = DMatrix::from_fn(k, k, |a, b| distances[(members[a], members[b])]);
    let passes = config
        .max_smoothing_passes
        .unwrap_or_else(|| default_passes(k));
    let smoothed = trineq_filter_capped(&sub, passes);

    let max = config.prior_dimension.min(k - 1).max(1);
    let spectrum = spectral::embed(
        &smoothed.metric,
        smoothed.diag_shift,
        config.evfract,
        DimensionBounds { min: 1, max },
        config.seed.wrapping_add(cluster as u64),
        config.solver,
    )?;

    let rows: Vec<DVector<f64>> = (0..k)
        .map(|i| spectrum.coords.row(i).transpose())
        .collect();
    let local_sqdist = squared_distance_matrix(&rows);
    let distortion = mean_abs_distance_error(&local_sqdist, &sub).unwrap_or(0.0);

    debug!(
        cluster,
        members = k,
        dimension = spectrum.dimension(),
        smoothing_passes = smoothed.passes,
        residual_violations = smoothed.violations,
        distortion,
        "Embedded cluster locally."
    );
    Ok(LocalFrame {
        cluster,
        members: members.to_vec(),
        coords: spectrum.coords,
        moments: spectrum.moments,
        local_sqdist,
        smoothing_passes: smoothed.passes,
        distortion,
    })
}
