use crate::cli::ClustersArgs;
use crate::config::PartialFoldConfig;
use crate::error::{CliError, Result};
use crate::io;
use hipfold::core::models::cluster::{ClusterKind, ClusterLayout};
use std::fmt::Write;
use tracing::info;

pub fn run(args: ClustersArgs) -> Result<()> {
    let partial = PartialFoldConfig::load(args.config.as_deref())?;
    let plan = partial.layout_plan(args.cluster_count)?;

    let len = match (&args.input, args.length) {
        (Some(path), _) => io::read_matrix(path, false)?.nrows(),
        (None, Some(len)) => len,
        (None, None) => {
            return Err(CliError::Config(
                "Either a chain length or an input matrix is required.".to_string(),
            ));
        }
    };

    let layout = plan.build(len);
    info!(clusters = layout.cluster_count(), "Built cluster layout.");
    print!("{}", render(&layout));
    Ok(())
}

fn kind_label(kind: ClusterKind) -> &'static str {
    match kind {
        ClusterKind::Helix => "helix",
        ClusterKind::Sheet => "sheet",
        ClusterKind::Coil => "coil",
        ClusterKind::Unknown => "mesh",
    }
}

/// One line per cluster with its kind, size and member runs.
pub fn render(layout: &ClusterLayout) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} positions in {} clusters",
        layout.len(),
        layout.cluster_count()
    );
    let _ = writeln!(out, "{:>7}  {:<5}  {:>5}  positions", "cluster", "kind", "size");
    for (i, cluster) in layout.clusters().iter().enumerate() {
        let runs = cluster
            .members()
            .runs()
            .iter()
            .map(|span| {
                if span.start == span.end {
                    span.start.to_string()
                } else {
                    format!("{}-{}", span.start, span.end)
                }
            })
            .collect::<Vec<_>>()
            .join(",");
        let _ = writeln!(
            out,
            "{:>7}  {:<5}  {:>5}  {}",
            i,
            kind_label(cluster.kind()),
            cluster.size(),
            runs
        );
    }
    out
}
