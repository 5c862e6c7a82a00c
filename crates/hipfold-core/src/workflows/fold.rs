use crate::core::models::cluster::ClusterLayout;
use crate::core::models::points::PointSet;
use crate::core::utils::geometry::mean_abs_distance_error;
use crate::engine::config::FoldConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::projection::{self, ProjectionReport};
use crate::engine::tangle::{self, TangleOutcome};
use nalgebra::DMatrix;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct FoldResult {
    pub coords: PointSet,
    /// Dimensionality chosen by the projection before squeezing.
    pub projection_dimension: usize,
    pub projection: ProjectionReport,
    pub tangle: TangleOutcome,
    /// Restraint pairs overwritten with ideal segment geometry.
    pub refreshed_pairs: usize,
    /// Mean absolute distance error of the final coordinates.
    pub final_error: Option<f64>,
}

#[instrument(skip_all, name = "fold_workflow")]
pub fn run(
    distances: &DMatrix<f64>,
    layout: &ClusterLayout,
    config: &FoldConfig,
    reporter: &ProgressReporter,
) -> Result<FoldResult, EngineError> {
    // === Phase 0: Restraint preparation ===
    let mut restraints = distances.clone();
    let mut refreshed_pairs = 0;
    if config.refresh_ideal_segments && restraints.nrows() == layout.len() {
        reporter.report(Progress::PhaseStart {
            name: "Ideal Geometry",
        });
        for segment in layout.clusters().iter().filter_map(|c| c.segment()) {
            refreshed_pairs += segment.refresh_ideal(&mut restraints);
        }
        info!(pairs = refreshed_pairs, "Refreshed restraints from ideal segment geometry.");
        reporter.report(Progress::PhaseFinish);
    }

    // === Phase 1: Hierarchic projection ===
    let projected = projection::full_project(&restraints, layout, &config.projection, reporter)?;
    let mut coords = projected.coords;

    // === Phase 2: Dimension squeezing ===
    if coords.dim() != config.target_dimension {
        projection::squeeze(&mut coords, config.target_dimension)
            .map_err(EngineError::numerical("dimension squeezing"))?;
        info!(
            from = projected.dimension,
            to = config.target_dimension,
            "Squeezed coordinates to the target dimension."
        );
    }

    // === Phase 3: Tangle elimination ===
    let tangle = tangle::tangle_elim(layout, &mut coords, &config.tangle, reporter);

    let final_error = mean_abs_distance_error(&coords.sqdist_matrix(&coords.view()), distances);
    info!(
        dimension = coords.dim(),
        violations = tangle.violations,
        final_error = final_error.unwrap_or(0.0),
        "Fold workflow complete."
    );
    Ok(FoldResult {
        coords,
        projection_dimension: projected.dimension,
        projection: projected.report,
        tangle,
        refreshed_pairs,
        final_error,
    })
}
