use crate::cli::{FoldArgs, Overrides};
use crate::error::{CliError, Result};
use hipfold::core::models::cluster::ClusterLayout;
use hipfold::core::models::segment::{Segment, Span};
use hipfold::engine::config::{self as core_config, FoldConfig};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

pub const DEFAULT_PRECISION: usize = 6;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialProjectionConfig {
    evfract: Option<f64>,
    prior_dimension: Option<usize>,
    max_smoothing_passes: Option<usize>,
    mirror_max_passes: Option<usize>,
    seed: Option<u64>,
    cluster_count: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialTangleConfig {
    step: Option<f64>,
    max_iterations: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialOutputConfig {
    target_dimension: Option<usize>,
    refresh_ideal_segments: Option<bool>,
    precision: Option<usize>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum SegmentKind {
    Helix,
    Sheet,
    Coil,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialSegment {
    kind: SegmentKind,
    /// Inclusive `[start, end]` position pairs.
    spans: Vec<[usize; 2]>,
}

impl TryFrom<PartialSegment> for Segment {
    type Error = CliError;

    fn try_from(p: PartialSegment) -> Result<Self> {
        let mut spans: Vec<Span> = p.spans.iter().map(|&[a, b]| Span::new(a, b)).collect();
        match (p.kind, spans.len()) {
            (_, 0) => Err(CliError::Config(format!(
                "A {:?} segment needs at least one span.",
                p.kind
            ))),
            (SegmentKind::Sheet, _) => Ok(Segment::Sheet(spans)),
            (SegmentKind::Helix, 1) => Ok(Segment::Helix(spans.remove(0))),
            (SegmentKind::Coil, 1) => Ok(Segment::Coil(spans.remove(0))),
            (kind, n) => Err(CliError::Config(format!(
                "A {:?} segment takes exactly one span, found {}.",
                kind, n
            ))),
        }
    }
}

/// How the chain is partitioned into clusters.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutPlan {
    /// Secondary-structure segments; gaps become coil clusters.
    Segments(Vec<Segment>),
    /// Round-robin meshing; `0` derives the count from the chain length.
    Meshed { count: usize },
}

impl LayoutPlan {
    pub fn build(&self, len: usize) -> ClusterLayout {
        match self {
            LayoutPlan::Segments(segments) => {
                for segment in segments {
                    if segment.spans().iter().any(|s| s.end >= len) {
                        warn!(
                            "Segment {:?} reaches past the last position ({}); the excess is ignored.",
                            segment,
                            len.saturating_sub(1)
                        );
                    }
                }
                ClusterLayout::from_segments(len, segments.clone())
            }
            LayoutPlan::Meshed { count } => ClusterLayout::make_clusters(len, *count),
        }
    }
}

/// Everything `fold` needs after file and command line are merged.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub fold: FoldConfig,
    pub layout: LayoutPlan,
    pub precision: usize,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PartialFoldConfig {
    projection: Option<PartialProjectionConfig>,
    tangle: Option<PartialTangleConfig>,
    output: Option<PartialOutputConfig>,
    #[serde(rename = "segment", default)]
    segments: Vec<PartialSegment>,
}

impl PartialFoldConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Loads `path` when given, otherwise starts from an empty configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::from_file)
    }

    /// Segments win over meshing; the cluster count only matters without them.
    pub fn layout_plan(&self, cluster_count: Option<usize>) -> Result<LayoutPlan> {
        if !self.segments.is_empty() {
            if cluster_count.is_some() {
                warn!("Segments are configured; ignoring the cluster count override.");
            }
            let segments = self
                .segments
                .iter()
                .cloned()
                .map(Segment::try_from)
                .collect::<Result<Vec<_>>>()?;
            return Ok(LayoutPlan::Segments(segments));
        }
        let count = cluster_count
            .or(self.projection.as_ref().and_then(|p| p.cluster_count))
            .unwrap_or(0);
        Ok(LayoutPlan::Meshed { count })
    }

    pub fn merge_with_cli(mut self, args: &FoldArgs) -> Result<RunSettings> {
        let overrides: &Overrides = &args.overrides;
        let layout = self.layout_plan(overrides.cluster_count)?;

        let proj = self.projection.take().unwrap_or_default();
        let tangle = self.tangle.take().unwrap_or_default();
        let output = self.output.take().unwrap_or_default();

        let mut projection_builder = core_config::ProjectionConfigBuilder::new()
            .evfract(
                overrides
                    .evfract
                    .or(proj.evfract)
                    .unwrap_or(core_config::DEFAULT_EVFRACT),
            )
            .prior_dimension(
                overrides
                    .prior_dimension
                    .or(proj.prior_dimension)
                    .unwrap_or(core_config::DEFAULT_PRIOR_DIMENSION),
            );
        if let Some(passes) = proj.max_smoothing_passes {
            projection_builder = projection_builder.max_smoothing_passes(passes);
        }
        if let Some(passes) = proj.mirror_max_passes {
            projection_builder = projection_builder.mirror_max_passes(passes);
        }
        if let Some(seed) = overrides.seed.or(proj.seed) {
            projection_builder = projection_builder.seed(seed);
        }
        let projection = projection_builder
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;

        let tangle = core_config::TangleConfigBuilder::new()
            .step(
                overrides
                    .step
                    .or(tangle.step)
                    .unwrap_or(core_config::DEFAULT_TANGLE_STEP),
            )
            .max_iterations(
                overrides
                    .max_iterations
                    .or(tangle.max_iterations)
                    .unwrap_or(core_config::DEFAULT_TANGLE_MAX_ITERATIONS),
            )
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;

        let fold = core_config::FoldConfigBuilder::new()
            .projection(projection)
            .tangle(tangle)
            .target_dimension(
                args.target_dimension
                    .or(output.target_dimension)
                    .unwrap_or(core_config::DEFAULT_TARGET_DIMENSION),
            )
            .refresh_ideal_segments(
                args.refresh_ideal || output.refresh_ideal_segments.unwrap_or(false),
            )
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;

        Ok(RunSettings {
            fold,
            layout,
            precision: args
                .precision
                .or(output.precision)
                .unwrap_or(DEFAULT_PRECISION),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn args(overrides: Overrides) -> FoldArgs {
        FoldArgs {
            input: PathBuf::from("in.csv"),
            output: PathBuf::from("out.csv"),
            config: None,
            plain_distances: false,
            overrides,
            target_dimension: None,
            refresh_ideal: false,
            precision: None,
        }
    }

    const FULL_CONFIG: &str = r#"
        [projection]
        evfract = 0.75
        prior-dimension = 4
        max-smoothing-passes = 12
        mirror-max-passes = 3
        seed = 99

        [tangle]
        step = 0.5
        max-iterations = 7

        [output]
        target-dimension = 2
        refresh-ideal-segments = true
        precision = 3

        [[segment]]
        kind = "helix"
        spans = [[2, 11]]

        [[segment]]
        kind = "sheet"
        spans = [[14, 18], [22, 26]]
    "#;

    #[test]
    fn full_file_is_merged_into_the_library_config() {
        let partial = PartialFoldConfig::from_toml(FULL_CONFIG).unwrap();
        let settings = partial.merge_with_cli(&args(Overrides::default())).unwrap();

        assert_eq!(settings.fold.projection.evfract, 0.75);
        assert_eq!(settings.fold.projection.prior_dimension, 4);
        assert_eq!(settings.fold.projection.max_smoothing_passes, Some(12));
        assert_eq!(settings.fold.projection.mirror_max_passes, 3);
        assert_eq!(settings.fold.projection.seed, 99);
        assert_eq!(settings.fold.tangle.step, 0.5);
        assert_eq!(settings.fold.tangle.max_iterations, 7);
        assert_eq!(settings.fold.target_dimension, 2);
        assert!(settings.fold.refresh_ideal_segments);
        assert_eq!(settings.precision, 3);
        assert_eq!(
            settings.layout,
            LayoutPlan::Segments(vec![
                Segment::Helix(Span::new(2, 11)),
                Segment::Sheet(vec![Span::new(14, 18), Span::new(22, 26)]),
            ])
        );
    }

    #[test]
    fn command_line_overrides_the_file() {
        let partial = PartialFoldConfig::from_toml(FULL_CONFIG).unwrap();
        let mut fold_args = args(Overrides {
            evfract: Some(0.95),
            step: Some(2.0),
            max_iterations: Some(1),
            ..Overrides::default()
        });
        fold_args.target_dimension = Some(3);
        let settings = partial.merge_with_cli(&fold_args).unwrap();
        assert_eq!(settings.fold.projection.evfract, 0.95);
        assert_eq!(settings.fold.projection.prior_dimension, 4);
        assert_eq!(settings.fold.tangle.step, 2.0);
        assert_eq!(settings.fold.tangle.max_iterations, 1);
        assert_eq!(settings.fold.target_dimension, 3);
    }

    #[test]
    fn empty_config_falls_back_to_library_defaults() {
        let settings = PartialFoldConfig::default()
            .merge_with_cli(&args(Overrides::default()))
            .unwrap();
        assert_eq!(settings.fold, FoldConfig::default());
        assert_eq!(settings.layout, LayoutPlan::Meshed { count: 0 });
        assert_eq!(settings.precision, DEFAULT_PRECISION);
    }

    #[test]
    fn cluster_count_comes_from_file_or_flag() {
        let partial = PartialFoldConfig::from_toml("[projection]\ncluster-count = 4\n").unwrap();
        assert_eq!(partial.layout_plan(None).unwrap(), LayoutPlan::Meshed { count: 4 });
        assert_eq!(partial.layout_plan(Some(6)).unwrap(), LayoutPlan::Meshed { count: 6 });
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(PartialFoldConfig::from_toml("[projection]\nev-fraction = 0.9\n").is_err());
        assert!(PartialFoldConfig::from_toml("[solver]\nsteps = 3\n").is_err());
    }

    #[test]
    fn helix_with_two_spans_is_a_config_error() {
        let partial = PartialFoldConfig::from_toml(
            "[[segment]]\nkind = \"helix\"\nspans = [[0, 3], [5, 8]]\n",
        )
        .unwrap();
        assert!(matches!(partial.layout_plan(None), Err(CliError::Config(_))));
    }

    #[test]
    fn invalid_values_surface_as_config_errors() {
        let partial = PartialFoldConfig::from_toml("[projection]\nevfract = 1.5\n").unwrap();
        let result = partial.merge_with_cli(&args(Overrides::default()));
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("evfract")));
    }

    #[test]
    fn config_file_is_read_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[tangle]\nstep = 3.0\nmax-iterations = 2\n").unwrap();
        let partial = PartialFoldConfig::load(Some(file.path())).unwrap();
        let settings = partial.merge_with_cli(&args(Overrides::default())).unwrap();
        assert_eq!(settings.fold.tangle.step, 3.0);
        assert_eq!(settings.fold.tangle.max_iterations, 2);
    }

    #[test]
    fn malformed_file_reports_its_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[tangle\nstep = ").unwrap();
        let result = PartialFoldConfig::from_file(file.path());
        assert!(matches!(result, Err(CliError::FileParsing { path, .. }) if path == file.path()));
    }

    #[test]
    fn meshed_plan_builds_a_round_robin_layout() {
        let layout = LayoutPlan::Meshed { count: 3 }.build(30);
        assert_eq!(layout.len(), 30);
        assert_eq!(layout.cluster_count(), 3);
    }
}
