use super::LinalgError;
use nalgebra::{DMatrix, DVector};

const MAX_SVD_ITERATIONS: usize = 1000;

/// Thin singular value decomposition `A = U diag(W) Vᵀ` of an `m x n` matrix
/// with `m >= n`.
#[derive(Debug, Clone)]
pub struct Svd {
    /// `m x n`, orthonormal columns.
    pub u: DMatrix<f64>,
    /// Non-negative singular values, length `n`.
    pub w: DVector<f64>,
    /// `n x n`, orthogonal.
    pub v: DMatrix<f64>,
}

impl Svd {
    pub fn new(a: &DMatrix<f64>) -> Result<Self, LinalgError> {
        let (m, n) = a.shape();
        if n == 0 {
            return Err(LinalgError::Empty);
        }
        if m < n {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                found: m,
            });
        }
        let svd = a
            .clone()
            .try_svd(true, true, f64::EPSILON, MAX_SVD_ITERATIONS)
            .ok_or(LinalgError::NoConvergence {
                iterations: MAX_SVD_ITERATIONS,
            })?;
        let u = svd.u.ok_or(LinalgError::NoConvergence {
            iterations: MAX_SVD_ITERATIONS,
        })?;
        let v_t = svd.v_t.ok_or(LinalgError::NoConvergence {
            iterations: MAX_SVD_ITERATIONS,
        })?;
        Ok(Self {
            u,
            w: svd.singular_values,
            v: v_t.transpose(),
        })
    }

    /// Zeroes every singular value below `tol` times the largest one and
    /// returns the remaining rank together with the condition number of the
    /// retained part (`inf` when nothing is retained).
    pub fn rank_cond(&mut self, tol: f64) -> (usize, f64) {
        let w_max = self.w.iter().cloned().fold(0.0, f64::max);
        let threshold = tol * w_max;
        let mut rank = 0;
        let mut w_min = f64::INFINITY;
        for w in self.w.iter_mut() {
            if *w <= threshold || *w <= 0.0 {
                *w = 0.0;
            } else {
                rank += 1;
                w_min = w_min.min(*w);
            }
        }
        let cond = if rank == 0 { f64::INFINITY } else { w_max / w_min };
        (rank, cond)
    }

    /// Least-squares solution of `A x = b` using the (possibly truncated)
    /// decomposition; zero singular values are skipped.
    pub fn lin_solve(&self, b: &DVector<f64>) -> Result<DVector<f64>, LinalgError> {
        if b.len() != self.u.nrows() {
            return Err(LinalgError::DimensionMismatch {
                expected: self.u.nrows(),
                found: b.len(),
            });
        }
        let utb = self.u.transpose() * b;
        let scaled = DVector::from_iterator(
            self.w.len(),
            utb.iter()
                .zip(self.w.iter())
                .map(|(&c, &w)| if w > 0.0 { c / w } else { 0.0 }),
        );
        Ok(&self.v * scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_reconstructs_input_matrix() {
        let a = DMatrix::from_row_slice(4, 3, &[
            1.0, 2.0, 0.0, //
            0.0, 1.0, 1.0, //
            3.0, 0.0, 1.0, //
            1.0, 1.0, 1.0,
        ]);
        let svd = Svd::new(&a).unwrap();
        assert_eq!(svd.u.shape(), (4, 3));
        assert_eq!(svd.v.shape(), (3, 3));
        let rebuilt = &svd.u * DMatrix::from_diagonal(&svd.w) * svd.v.transpose();
        assert!((rebuilt - a).norm() < 1e-10);
        assert!(svd.w.iter().all(|&w| w >= 0.0));
    }

    #[test]
    fn new_rejects_wide_matrices() {
        let a = DMatrix::<f64>::zeros(2, 3);
        assert!(matches!(
            Svd::new(&a),
            Err(LinalgError::DimensionMismatch { expected: 3, found: 2 })
        ));
    }

    #[test]
    fn rank_cond_detects_rank_deficiency() {
        let a = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 1.0, 0.0, 1.0]);
        let mut svd = Svd::new(&a).unwrap();
        let (rank, cond) = svd.rank_cond(1e-10);
        assert_eq!(rank, 2);
        assert!(cond.is_finite() && cond >= 1.0);
        assert_eq!(svd.w.iter().filter(|&&w| w == 0.0).count(), 1);
    }

    #[test]
    fn rank_cond_of_zero_matrix_is_infinite() {
        let mut svd = Svd::new(&DMatrix::<f64>::zeros(3, 2)).unwrap();
        let (rank, cond) = svd.rank_cond(1e-10);
        assert_eq!(rank, 0);
        assert!(cond.is_infinite());
    }

    #[test]
    fn lin_solve_solves_square_system() {
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]);
        let x_true = DVector::from_column_slice(&[1.0, -2.0]);
        let b = &a * &x_true;
        let svd = Svd::new(&a).unwrap();
        let x = svd.lin_solve(&b).unwrap();
        assert!((x - x_true).norm() < 1e-10);
    }

    #[test]
    fn lin_solve_returns_least_squares_for_overdetermined_system() {
        let a = DMatrix::from_row_slice(3, 1, &[1.0, 1.0, 1.0]);
        let b = DVector::from_column_slice(&[1.0, 2.0, 6.0]);
        let svd = Svd::new(&a).unwrap();
        let x = svd.lin_solve(&b).unwrap();
        assert!((x[0] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn lin_solve_rejects_wrong_rhs_length() {
        let svd = Svd::new(&DMatrix::<f64>::identity(2, 2)).unwrap();
        assert!(svd.lin_solve(&DVector::zeros(3)).is_err());
    }
}
