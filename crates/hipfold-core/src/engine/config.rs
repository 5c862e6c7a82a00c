use crate::core::linalg::SolverLimits;
use thiserror::Error;

pub const DEFAULT_EVFRACT: f64 = 0.9;
pub const DEFAULT_PRIOR_DIMENSION: usize = 3;
pub const DEFAULT_MIRROR_MAX_PASSES: usize = 10;
pub const DEFAULT_SEED: u64 = 0x68_69_70;
pub const DEFAULT_TANGLE_STEP: f64 = 1.0;
pub const DEFAULT_TANGLE_MAX_ITERATIONS: usize = 20;
pub const DEFAULT_TARGET_DIMENSION: usize = 3;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionConfig {
    /// Fraction of the positive eigenvalue mass an embedding must explain.
    pub evfract: f64,
    /// Upper bound for local embedding dimensions and the preferred skeleton
    /// dimension.
    pub prior_dimension: usize,
    /// Overrides the size-dependent smoothing pass budget when set.
    pub max_smoothing_passes: Option<usize>,
    /// Cap on the greedy mirror-resolution sweeps.
    pub mirror_max_passes: usize,
    /// Seed of the start block for partial eigen-decompositions.
    pub seed: u64,
    pub solver: SolverLimits,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            evfract: DEFAULT_EVFRACT,
            prior_dimension: DEFAULT_PRIOR_DIMENSION,
            max_smoothing_passes: None,
            mirror_max_passes: DEFAULT_MIRROR_MAX_PASSES,
            seed: DEFAULT_SEED,
            solver: SolverLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TangleConfig {
    /// Extra separation applied to every entangled cluster pair per round.
    pub step: f64,
    pub max_iterations: usize,
}

impl Default for TangleConfig {
    fn default() -> Self {
        Self {
            step: DEFAULT_TANGLE_STEP,
            max_iterations: DEFAULT_TANGLE_MAX_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoldConfig {
    pub projection: ProjectionConfig,
    pub tangle: TangleConfig,
    pub target_dimension: usize,
    pub refresh_ideal_segments: bool,
}

impl Default for FoldConfig {
    fn default() -> Self {
        Self {
            projection: ProjectionConfig::default(),
            tangle: TangleConfig::default(),
            target_dimension: DEFAULT_TARGET_DIMENSION,
            refresh_ideal_segments: false,
        }
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

#[derive(Default)]
pub struct ProjectionConfigBuilder {
    evfract: Option<f64>,
    prior_dimension: Option<usize>,
    max_smoothing_passes: Option<usize>,
    mirror_max_passes: Option<usize>,
    seed: Option<u64>,
    solver: Option<SolverLimits>,
}

impl ProjectionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evfract(mut self, fraction: f64) -> Self {
        self.evfract = Some(fraction);
        self
    }
    pub fn prior_dimension(mut self, dim: usize) -> Self {
        self.prior_dimension = Some(dim);
        self
    }
    pub fn max_smoothing_passes(mut self, passes: usize) -> Self {
        self.max_smoothing_passes = Some(passes);
        self
    }
    pub fn mirror_max_passes(mut self, passes: usize) -> Self {
        self.mirror_max_passes = Some(passes);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn solver_limits(mut self, limits: SolverLimits) -> Self {
        self.solver = Some(limits);
        self
    }

    pub fn build(self) -> Result<ProjectionConfig, ConfigError> {
        let evfract = self
            .evfract
            .ok_or(ConfigError::MissingParameter("evfract"))?;
        if !(evfract > 0.0 && evfract <= 1.0) {
            return Err(invalid("evfract", format!("{evfract} is not in (0, 1]")));
        }
        let prior_dimension = self
            .prior_dimension
            .ok_or(ConfigError::MissingParameter("prior_dimension"))?;
        if prior_dimension == 0 {
            return Err(invalid("prior_dimension", "must be at least 1"));
        }
        if self.max_smoothing_passes == Some(0) {
            return Err(invalid("max_smoothing_passes", "must be at least 1"));
        }
        Ok(ProjectionConfig {
            evfract,
            prior_dimension,
            max_smoothing_passes: self.max_smoothing_passes,
            mirror_max_passes: self.mirror_max_passes.unwrap_or(DEFAULT_MIRROR_MAX_PASSES),
            seed: self.seed.unwrap_or(DEFAULT_SEED),
            solver: self.solver.unwrap_or_default(),
        })
    }
}

#[derive(Default)]
pub struct TangleConfigBuilder {
    step: Option<f64>,
    max_iterations: Option<usize>,
}

impl TangleConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }
    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }

    pub fn build(self) -> Result<TangleConfig, ConfigError> {
        let step = self.step.ok_or(ConfigError::MissingParameter("step"))?;
        if !(step.is_finite() && step > 0.0) {
            return Err(invalid("step", format!("{step} is not a positive length")));
        }
        Ok(TangleConfig {
            step,
            max_iterations: self
                .max_iterations
                .ok_or(ConfigError::MissingParameter("max_iterations"))?,
        })
    }
}

#[derive(Default)]
pub struct FoldConfigBuilder {
    projection: Option<ProjectionConfig>,
    tangle: Option<TangleConfig>,
    target_dimension: Option<usize>,
    refresh_ideal_segments: Option<bool>,
}

impl FoldConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn projection(mut self, config: ProjectionConfig) -> Self {
        self.projection = Some(config);
        self
    }
    pub fn tangle(mut self, config: TangleConfig) -> Self {
        self.tangle = Some(config);
        self
    }
    pub fn target_dimension(mut self, dim: usize) -> Self {
        self.target_dimension = Some(dim);
        self
    }
    pub fn refresh_ideal_segments(mut self, refresh: bool) -> Self {
        self.refresh_ideal_segments = Some(refresh);
        self
    }

    pub fn build(self) -> Result<FoldConfig, ConfigError> {
        let target_dimension = self.target_dimension.unwrap_or(DEFAULT_TARGET_DIMENSION);
        if target_dimension == 0 {
            return Err(invalid("target_dimension", "must be at least 1"));
        }
        Ok(FoldConfig {
            projection: self
                .projection
                .ok_or(ConfigError::MissingParameter("projection"))?,
            tangle: self.tangle.ok_or(ConfigError::MissingParameter("tangle"))?,
            target_dimension,
            refresh_ideal_segments: self.refresh_ideal_segments.unwrap_or(false),
        })
    }
}
