use crate::core::linalg::{
    Eigen, LinalgError, SolverLimits, eigen_decompose_capped, eigen_partial_capped,
};
use nalgebra::{DMatrix, DVector};
use tracing::{trace, warn};

/// Matrices larger than this are decomposed with subspace iteration.
const PARTIAL_EIGEN_THRESHOLD: usize = 100;
/// Eigenvalues below this fraction of the largest one count as noise.
const EIGEN_NOISE_FRACTION: f64 = 1e-10;
const SEED_PERTURBATION: u64 = 0x9E37_79B9_7F4A_7C15;

/// Inclusive bounds on the number of retained axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DimensionBounds {
    pub min: usize,
    pub max: usize,
}

/// Coordinates and inertial moments of a spectral embedding.
#[derive(Debug, Clone)]
pub(crate) struct Spectrum {
    /// One row per point, one column per retained axis.
    pub coords: DMatrix<f64>,
    pub moments: DVector<f64>,
    /// Number of axes the eigenvalue fraction asked for before bounding.
    pub selected: usize,
}

impl Spectrum {
    pub fn dimension(&self) -> usize {
        self.moments.len()
    }
}

/// Leading eigenpairs of `metric`. Matrices above the partial threshold use
/// subspace iteration; a run that does not converge is retried once with a
/// perturbed seed before the full solver takes over.
fn decompose(
    metric: &DMatrix<f64>,
    wanted: usize,
    seed: u64,
    limits: SolverLimits,
) -> Result<Eigen, LinalgError> {
    let n = metric.nrows();
    let full = || eigen_decompose_capped(metric, limits.full_iterations);
    if n <= PARTIAL_EIGEN_THRESHOLD {
        return full();
    }
    let partial = |seed| eigen_partial_capped(metric, wanted, seed, limits.subspace_iterations);
    match partial(seed) {
        Ok(eig) => Ok(eig),
        Err(e) => {
            warn!(error = %e, size = n, "Partial eigen-decomposition failed; retrying with a perturbed seed.");
            partial(seed.wrapping_add(SEED_PERTURBATION)).or_else(|e| {
                warn!(error = %e, size = n, "Retry failed; falling back to a full decomposition.");
                full()
            })
        }
    }
}

/// Embeds a (possibly diagonal-shifted) Gram matrix.
///
/// `diag_shift` is removed from every eigenvalue. The dimension is the
/// smallest count whose leading eigenvalues reach `evfract` of the positive
/// mass, clamped to `bounds`. Axes beyond the available spectrum are zero.
/// Every axis is oriented so that point 0 has a non-negative coordinate.
pub(crate) fn embed(
    metric: &DMatrix<f64>,
    diag_shift: f64,
    evfract: f64,
    bounds: DimensionBounds,
    seed: u64,
    limits: SolverLimits,
) -> Result<Spectrum, LinalgError> {
    let n = metric.nrows();
    let eig = decompose(metric, bounds.max.max(bounds.min), seed, limits)?;
    let values: Vec<f64> = eig.values.iter().map(|v| v - diag_shift).collect();

    let largest = values.iter().cloned().fold(0.0, f64::max);
    let noise = EIGEN_NOISE_FRACTION * largest;
    let positive: Vec<f64> = values.iter().cloned().take_while(|&v| v > noise).collect();

    let computed_mass: f64 = positive.iter().sum();
    let mass = if eig.len() < n {
        let trace = metric.trace() - n as f64 * diag_shift;
        trace.max(computed_mass)
    } else {
        computed_mass
    };

    let target = evfract * mass;
    let mut selected = positive.len();
    let mut cumulative = 0.0;
    for (k, v) in positive.iter().enumerate() {
        cumulative += v;
        if cumulative >= target {
            selected = k + 1;
            break;
        }
    }
    let selected = selected.max(1);
    let dim = selected.min(bounds.max).max(bounds.min);

    let mut coords = DMatrix::zeros(n, dim);
    let mut moments = DVector::zeros(dim);
    for axis in 0..dim.min(eig.len()) {
        if values[axis] <= noise {
            continue;
        }
        let moment = values[axis].sqrt();
        moments[axis] = moment;
        let mut column = eig.vectors.column(axis) * moment;
        if n > 0 && column[0] < 0.0 {
            column.neg_mut();
        }
        coords.set_column(axis, &column);
    }

    trace!(
        points = n,
        positive = positive.len(),
        selected,
        dim,
        "Spectral embedding complete."
    );
    Ok(Spectrum {
        coords,
        moments,
        selected,
    })
}
