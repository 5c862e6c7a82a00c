use super::conversion::{centre_dist, dist_metric, metric_dist};
use nalgebra::DMatrix;
use tracing::{debug, trace};

/// Fraction of the geometric bound an offending scalar product is clamped to.
const COSINE_CLAMP: f64 = 0.99;
/// Relative slack below which a bound excess is treated as round-off.
const BALANCE_TOLERANCE: f64 = 1e-10;
const MAX_SMOOTHING_PASSES: usize = 100;

/// Outcome of one balancing pass over a metric matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Balance {
    pub violations: usize,
    /// Amount added to every diagonal element in this pass.
    pub diag_shift: f64,
}

/// Result of iterated triangle-inequality smoothing.
#[derive(Debug, Clone, PartialEq)]
pub struct Smoothing {
    pub metric: DMatrix<f64>,
    pub distances: DMatrix<f64>,
    pub passes: usize,
    /// Violations corrected in the last pass; zero means converged.
    pub violations: usize,
    /// Cumulative diagonal shift, to be subtracted from eigenvalues.
    pub diag_shift: f64,
}

/// Balances a Gram matrix in place.
///
/// A negative diagonal element is an impossible squared centroid distance;
/// when one is found, the whole diagonal is shifted by twice the worst
/// offender. Afterwards every off-diagonal scalar product whose implied
/// cosine leaves `[-1, 1]` is clamped to `±0.99` of its geometric bound.
pub fn trieq_bal(metric: &mut DMatrix<f64>) -> Balance {
    let n = metric.nrows();
    if n == 0 || metric.ncols() != n {
        return Balance {
            violations: 0,
            diag_shift: 0.0,
        };
    }

    let scale = (0..n).map(|i| metric[(i, i)].abs()).fold(0.0, f64::max);
    let tol = BALANCE_TOLERANCE * scale;

    let mut violations = 0;
    let mut diag_shift = 0.0;
    let worst = (0..n).map(|i| metric[(i, i)]).fold(f64::INFINITY, f64::min);
    if worst < -tol {
        violations += (0..n).filter(|&i| metric[(i, i)] < -tol).count();
        diag_shift = -2.0 * worst;
        for i in 0..n {
            metric[(i, i)] += diag_shift;
        }
    }

    for i in 0..n {
        let gii = metric[(i, i)].max(0.0);
        for j in (i + 1)..n {
            let bound = (gii * metric[(j, j)].max(0.0)).sqrt();
            let g = metric[(i, j)];
            if g.abs() > bound + tol {
                let clamped = g.signum() * COSINE_CLAMP * bound;
                metric[(i, j)] = clamped;
                metric[(j, i)] = clamped;
                violations += 1;
            }
        }
    }

    trace!(violations, diag_shift, "Balanced metric matrix.");
    Balance {
        violations,
        diag_shift,
    }
}

/// Default pass budget for a matrix of `n` points: `max(1, min(100, n / 10))`.
pub fn default_passes(n: usize) -> usize {
    (n / 10).min(MAX_SMOOTHING_PASSES).max(1)
}

/// Iterates centroid distances, metric conversion and balancing until a pass
/// reports no violations or the default pass budget is spent.
pub fn trineq_filter(dist: &DMatrix<f64>) -> Smoothing {
    trineq_filter_capped(dist, default_passes(dist.nrows()))
}

/// As [`trineq_filter`] with an explicit pass budget (at least one pass).
pub fn trineq_filter_capped(dist: &DMatrix<f64>, max_passes: usize) -> Smoothing {
    let max_passes = max_passes.max(1);
    let mut distances = dist.clone();
    let mut metric = DMatrix::zeros(dist.nrows(), dist.nrows());
    let mut diag_shift = 0.0;
    let mut violations = 0;
    let mut passes = 0;

    while passes < max_passes {
        passes += 1;
        let centre = centre_dist(&distances, None);
        metric = dist_metric(&distances, &centre.sqdist);
        let balance = trieq_bal(&mut metric);
        diag_shift += balance.diag_shift;
        violations = balance.violations;
        if violations == 0 {
            break;
        }
        distances = metric_dist(&metric);
    }

    debug!(
        points = dist.nrows(),
        passes, violations, diag_shift, "Triangle-inequality smoothing finished."
    );
    Smoothing {
        metric,
        distances,
        passes,
        violations,
        diag_shift,
    }
}
