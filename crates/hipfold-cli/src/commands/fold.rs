use crate::cli::FoldArgs;
use crate::config::PartialFoldConfig;
use crate::error::Result;
use crate::io;
use crate::utils::progress::CliProgressHandler;
use hipfold::engine::progress::ProgressReporter;
use hipfold::engine::tangle::TanglePhase;
use hipfold::workflows::{self, fold::FoldResult};
use std::fmt::Write;
use tracing::{info, warn};

pub fn run(args: FoldArgs, quiet: bool) -> Result<()> {
    let partial = PartialFoldConfig::load(args.config.as_deref())?;
    info!("Merging configuration from file and CLI arguments...");
    let settings = partial.merge_with_cli(&args)?;

    let distances = io::read_matrix(&args.input, args.plain_distances)?;
    let layout = settings.layout.build(distances.nrows());
    info!(
        positions = layout.len(),
        clusters = layout.cluster_count(),
        "Cluster layout ready."
    );

    let progress_handler = CliProgressHandler::new();
    let reporter = if quiet {
        ProgressReporter::new()
    } else {
        ProgressReporter::with_callback(progress_handler.get_callback())
    };

    if !quiet {
        println!("Folding {} positions...", layout.len());
    }
    info!("Invoking the core fold workflow...");
    let result = workflows::fold::run(&distances, &layout, &settings.fold, &reporter)?;

    io::write_coords(&args.output, &result.coords, settings.precision)?;
    if result.tangle.phase == TanglePhase::Exhausted {
        warn!(
            violations = result.tangle.violations,
            "Coordinates written with unresolved tangles."
        );
    }
    if !quiet {
        print!("{}", summary(&result));
        println!("✓ Coordinates written to: {}", args.output.display());
    }
    Ok(())
}

/// Human-readable digest of a fold run.
pub fn summary(result: &FoldResult) -> String {
    let report = &result.projection;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  Projection dimension: {} (written in {})",
        result.projection_dimension,
        result.coords.dim()
    );
    let _ = writeln!(
        out,
        "  Clusters: {} ({} skipped), skeleton points: {}",
        report.local_dimensions.len(),
        report.skipped_clusters.len(),
        report.skeleton_points
    );
    let _ = writeln!(
        out,
        "  Skeleton smoothing: {} pass(es), {} residual violation(s)",
        report.skeleton_smoothing_passes, report.skeleton_violations
    );
    let _ = writeln!(
        out,
        "  Mirrored clusters: {} after {} pass(es)",
        report.mirrored_clusters.len(),
        report.mirror_passes
    );
    if result.refreshed_pairs > 0 {
        let _ = writeln!(out, "  Ideal restraints: {} pair(s)", result.refreshed_pairs);
    }
    let status = match result.tangle.phase {
        TanglePhase::Clean => "clean",
        _ => "unresolved",
    };
    let _ = writeln!(
        out,
        "  Tangles: {} after {} round(s), {} pair(s) remaining",
        status, result.tangle.iterations, result.tangle.violations
    );
    match result.final_error {
        Some(err) => {
            let _ = writeln!(out, "  Mean |d error|: {:.4}", err);
        }
        None => {
            let _ = writeln!(out, "  Mean |d error|: n/a");
        }
    }
    out
}
