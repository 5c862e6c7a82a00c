//! Hierarchic inertial projection: squared distances to coordinates.
//!
//! Every cluster is first embedded in its own principal frame
//! ([`local`]). The cluster centroids, together with one satellite point per
//! local axis, form a small skeleton whose metric follows from the global
//! metric and the local frames ([`skeleton`]). The embedded skeleton then
//! fixes the position and orientation of every local frame ([`flesh`]).

pub mod flesh;
pub mod local;
pub mod skeleton;
mod spectral;

use crate::core::linalg::{LinalgError, eigen_decompose};
use crate::core::metric::{centre_dist, dist_metric};
use crate::core::models::cluster::ClusterLayout;
use crate::core::models::points::PointSet;
use crate::core::utils::geometry::mean_abs_distance_error;
use crate::engine::config::ProjectionConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use local::{LocalFrame, embed_cluster};
use nalgebra::DMatrix;
use tracing::{info, instrument, warn};

/// Diagnostics gathered during one projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionReport {
    /// Embedding dimension of every cluster, in layout order.
    pub local_dimensions: Vec<usize>,
    /// Mean absolute distance error of every local embedding.
    pub local_distortion: Vec<f64>,
    /// Clusters whose decomposition failed; their members were collapsed
    /// onto the cluster centroid.
    pub skipped_clusters: Vec<usize>,
    pub skeleton_points: usize,
    pub skeleton_smoothing_passes: usize,
    pub skeleton_violations: usize,
    pub mirrored_clusters: Vec<usize>,
    pub mirror_passes: usize,
    /// Mean absolute error of all reconstructed distances against the input.
    pub mean_abs_error: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Projection {
    pub dimension: usize,
    pub coords: PointSet,
    pub report: ProjectionReport,
}

/// Projects a squared-distance matrix over all positions of `layout` into
/// Cartesian coordinates.
///
/// The dimensionality is chosen from the eigenvalue fraction of the skeleton,
/// bounded below by `max(3, largest local dimension)` and above by
/// `prior_dimension` unless the lower bound exceeds it.
#[instrument(skip_all, name = "full_project")]
pub fn full_project(
    distances: &DMatrix<f64>,
    layout: &ClusterLayout,
    config: &ProjectionConfig,
    reporter: &ProgressReporter,
) -> Result<Projection, EngineError> {
    let n = layout.len();
    if distances.nrows() != n || distances.ncols() != n {
        let found = if distances.nrows() != n {
            distances.nrows()
        } else {
            distances.ncols()
        };
        return Err(EngineError::DimensionMismatch { expected: n, found });
    }
    if n == 0 {
        warn!("Nothing to project: the layout has no positions.");
        return Ok(Projection {
            dimension: 0,
            coords: PointSet::new(0, 0),
            report: ProjectionReport::default(),
        });
    }

    let mut report = ProjectionReport::default();

    reporter.report(Progress::PhaseStart {
        name: "Local Embedding",
    });
    let frames = embed_local_frames(distances, layout, config, &mut report, reporter);
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart {
        name: "Skeleton Embedding",
    });
    let centre = centre_dist(distances, None);
    let gram = dist_metric(distances, &centre.sqdist);
    let skeleton = skeleton::embed_skeleton(&frames, &gram, layout.generation(), config)?;
    report.skeleton_points = skeleton.index.len();
    report.skeleton_smoothing_passes = skeleton.smoothing_passes;
    report.skeleton_violations = skeleton.residual_violations;
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart {
        name: "Reconstruction",
    });
    let rebuilt = flesh::reconstruct(&frames, &skeleton, distances, n, config.mirror_max_passes);
    report.mirrored_clusters = rebuilt.mirrored;
    report.mirror_passes = rebuilt.mirror_passes;
    report.mean_abs_error = mean_abs_distance_error(
        &rebuilt.coords.sqdist_matrix(&rebuilt.coords.view()),
        distances,
    );
    reporter.report(Progress::PhaseFinish);

    let dimension = skeleton.dimension();
    info!(
        dimension,
        clusters = frames.len(),
        skipped = report.skipped_clusters.len(),
        mirrored = report.mirrored_clusters.len(),
        mean_abs_error = report.mean_abs_error.unwrap_or(0.0),
        "Projection complete."
    );
    Ok(Projection {
        dimension,
        coords: rebuilt.coords,
        report,
    })
}

/// Embeds every cluster of `layout` in its own frame. A cluster whose
/// decomposition fails is collapsed onto its centroid and listed in
/// `report.skipped_clusters`.
fn embed_local_frames(
    distances: &DMatrix<f64>,
    layout: &ClusterLayout,
    config: &ProjectionConfig,
    report: &mut ProjectionReport,
    reporter: &ProgressReporter,
) -> Vec<LocalFrame> {
    let task = reporter.task(layout.cluster_count() as u64);
    let mut frames = Vec::with_capacity(layout.cluster_count());
    for (c, cluster) in layout.clusters().iter().enumerate() {
        let members = cluster.indices();
        let frame = match embed_cluster(c, &members, distances, config) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(cluster = c, error = %e, "Local embedding failed; collapsing cluster onto its centroid.");
                report.skipped_clusters.push(c);
                LocalFrame::collapsed(c, members)
            }
        };
        report.local_dimensions.push(frame.dimension());
        report.local_distortion.push(frame.distortion);
        frames.push(frame);
        task.tick();
    }
    frames
}

/// Reduces `coords` to `target` dimensions by keeping the leading principal
/// axes of the active points; a larger `target` pads with zero axes.
pub fn squeeze(coords: &mut PointSet, target: usize) -> Result<(), LinalgError> {
    let dim = coords.dim();
    if target >= dim {
        coords.set_dimension(target);
        return Ok(());
    }
    let view = coords.view();
    let Some(centre) = coords.centroid(&view) else {
        coords.set_dimension(target);
        return Ok(());
    };

    let mut scatter = DMatrix::zeros(dim, dim);
    for &i in view.indices() {
        if let Some(p) = coords.point(i) {
            let r = p - &centre;
            scatter += &r * r.transpose();
        }
    }
    let eig = eigen_decompose(&scatter)?;
    let axes = eig.vectors.columns(0, target).transpose();

    let projected: Vec<_> = coords.points().iter().map(|p| &axes * (p - &centre)).collect();
    coords.set_dimension(target);
    for (i, p) in projected.into_iter().enumerate() {
        coords.set_point(i, p);
    }
    Ok(())
}
