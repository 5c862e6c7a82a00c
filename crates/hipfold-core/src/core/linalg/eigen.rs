use super::LinalgError;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::trace;

pub const MAX_QL_ITERATIONS: usize = 1000;
pub const MAX_SUBSPACE_ITERATIONS: usize = 600;
const SUBSPACE_TOLERANCE: f64 = 1e-10;
const SUBSPACE_OVERSAMPLING: usize = 4;
/// Below this size the partial solver just truncates a full decomposition.
const PARTIAL_MIN_SIZE: usize = 12;

/// Eigenpairs of a symmetric matrix, eigenvalues in descending order and
/// eigenvectors stored as the matching columns of `vectors`.
#[derive(Debug, Clone)]
pub struct Eigen {
    pub values: DVector<f64>,
    pub vectors: DMatrix<f64>,
}

impl Eigen {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn sorted(values: &DVector<f64>, vectors: &DMatrix<f64>, keep: usize) -> Self {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| {
            values[b]
                .partial_cmp(&values[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order.truncate(keep);

        let sorted_values = DVector::from_iterator(order.len(), order.iter().map(|&i| values[i]));
        let columns: Vec<DVector<f64>> = order.iter().map(|&i| vectors.column(i).into_owned()).collect();
        let sorted_vectors = if columns.is_empty() {
            DMatrix::zeros(vectors.nrows(), 0)
        } else {
            DMatrix::from_columns(&columns)
        };
        Self {
            values: sorted_values,
            vectors: sorted_vectors,
        }
    }
}

/// Iteration caps of the full (QL) and partial (subspace) eigensolvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverLimits {
    pub full_iterations: usize,
    pub subspace_iterations: usize,
}

impl Default for SolverLimits {
    fn default() -> Self {
        Self {
            full_iterations: MAX_QL_ITERATIONS,
            subspace_iterations: MAX_SUBSPACE_ITERATIONS,
        }
    }
}

fn check_square(m: &DMatrix<f64>) -> Result<(), LinalgError> {
    if m.nrows() != m.ncols() {
        return Err(LinalgError::NotSquare {
            rows: m.nrows(),
            cols: m.ncols(),
        });
    }
    Ok(())
}

/// Full eigen-decomposition of a symmetric matrix.
pub fn eigen_decompose(m: &DMatrix<f64>) -> Result<Eigen, LinalgError> {
    eigen_decompose_capped(m, MAX_QL_ITERATIONS)
}

/// As [`eigen_decompose`], giving up after `max_iterations` QL sweeps
/// (at least one).
pub fn eigen_decompose_capped(m: &DMatrix<f64>, max_iterations: usize) -> Result<Eigen, LinalgError> {
    check_square(m)?;
    let max_iterations = max_iterations.max(1);
    let n = m.nrows();
    if n == 0 {
        return Ok(Eigen {
            values: DVector::zeros(0),
            vectors: DMatrix::zeros(0, 0),
        });
    }
    let eig = SymmetricEigen::try_new(m.clone(), f64::EPSILON, max_iterations).ok_or(
        LinalgError::NoConvergence {
            iterations: max_iterations,
        },
    )?;
    Ok(Eigen::sorted(&eig.eigenvalues, &eig.eigenvectors, n))
}

/// Leading `k` eigenpairs of a symmetric matrix by orthogonal subspace
/// iteration with Rayleigh-Ritz extraction.
///
/// The matrix is shifted by its Gershgorin lower bound so that the dominant
/// subspace is the one of the algebraically largest eigenvalues; the shift is
/// removed from the returned values. `seed` selects the random start block, so
/// a caller can retry a non-converged run with a perturbed seed.
pub fn eigen_partial(m: &DMatrix<f64>, k: usize, seed: u64) -> Result<Eigen, LinalgError> {
    eigen_partial_capped(m, k, seed, MAX_SUBSPACE_ITERATIONS)
}

/// As [`eigen_partial`] with an explicit cap on subspace iterations.
pub fn eigen_partial_capped(
    m: &DMatrix<f64>,
    k: usize,
    seed: u64,
    max_iterations: usize,
) -> Result<Eigen, LinalgError> {
    check_square(m)?;
    let n = m.nrows();
    let k = k.min(n);
    if k == 0 {
        return Ok(Eigen {
            values: DVector::zeros(0),
            vectors: DMatrix::zeros(n, 0),
        });
    }
    if n <= PARTIAL_MIN_SIZE || k + SUBSPACE_OVERSAMPLING >= n {
        let full = eigen_decompose(m)?;
        return Ok(Eigen::sorted(&full.values, &full.vectors, k));
    }

    let shift = gershgorin_lower_bound(m).min(0.0).abs();
    let mut shifted = m.clone();
    for i in 0..n {
        shifted[(i, i)] += shift;
    }

    let block = k + SUBSPACE_OVERSAMPLING;
    let mut rng = StdRng::seed_from_u64(seed);
    let start = DMatrix::from_fn(n, block, |_, _| rng.gen_range(-1.0..1.0));
    let mut q = start.qr().q();
    let scale = shifted.norm().max(1.0);

    for iteration in 1..=max_iterations {
        let z = &shifted * &q;
        q = z.qr().q();

        let projected = q.transpose() * &shifted * &q;
        let small = eigen_decompose(&projected)?;
        let ritz_vectors = &q * &small.vectors;

        let residual = (0..k)
            .map(|c| {
                let x = ritz_vectors.column(c);
                (&shifted * x - x * small.values[c]).norm()
            })
            .fold(0.0, f64::max);

        trace!(iteration, residual, "Subspace iteration step.");

        if residual <= SUBSPACE_TOLERANCE * scale {
            let values = small.values.rows(0, k).map(|v| v - shift);
            let vectors = ritz_vectors.columns(0, k).into_owned();
            return Ok(Eigen { values, vectors });
        }
        q = ritz_vectors;
    }

    Err(LinalgError::NoConvergence {
        iterations: max_iterations,
    })
}

fn gershgorin_lower_bound(m: &DMatrix<f64>) -> f64 {
    (0..m.nrows())
        .map(|i| {
            let radius: f64 = (0..m.ncols())
                .filter(|&j| j != i)
                .map(|j| m[(i, j)].abs())
                .sum();
            m[(i, i)] - radius
        })
        .fold(f64::INFINITY, f64::min)
}
