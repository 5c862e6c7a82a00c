use super::numeric::sqrt_clamped;
use nalgebra::{DMatrix, DVector};

pub fn squared_distance(p: &DVector<f64>, q: &DVector<f64>) -> f64 {
    p.iter().zip(q.iter()).map(|(a, b)| (a - b) * (a - b)).sum()
}

/// Builds the full symmetric matrix of squared pairwise distances.
pub fn squared_distance_matrix(points: &[DVector<f64>]) -> DMatrix<f64> {
    let n = points.len();
    let mut dist = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let d2 = squared_distance(&points[i], &points[j]);
            dist[(i, j)] = d2;
            dist[(j, i)] = d2;
        }
    }
    dist
}

pub fn centroid(points: &[DVector<f64>]) -> Option<DVector<f64>> {
    let first = points.first()?;
    let mut sum = DVector::zeros(first.len());
    for p in points {
        if p.len() != sum.len() {
            return None;
        }
        sum += p;
    }
    Some(sum / points.len() as f64)
}

/// Mean absolute difference between the distances implied by two squared-distance
/// matrices, over the strict upper triangle.
pub fn mean_abs_distance_error(sqdist: &DMatrix<f64>, target_sqdist: &DMatrix<f64>) -> Option<f64> {
    let n = sqdist.nrows();
    if n < 2 || sqdist.shape() != target_sqdist.shape() {
        return None;
    }
    let mut sum = 0.0;
    let mut count = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            sum += (sqrt_clamped(sqdist[(i, j)]) - sqrt_clamped(target_sqdist[(i, j)])).abs();
            count += 1;
        }
    }
    Some(sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(coords: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(coords)
    }

    #[test]
    fn squared_distance_matrix_is_symmetric_with_zero_diagonal() {
        let pts = vec![p(&[0.0, 0.0]), p(&[3.0, 0.0]), p(&[0.0, 4.0])];
        let d = squared_distance_matrix(&pts);
        assert_eq!(d[(0, 1)], 9.0);
        assert_eq!(d[(1, 0)], 9.0);
        assert_eq!(d[(1, 2)], 25.0);
        assert_eq!(d[(2, 2)], 0.0);
    }

    #[test]
    fn centroid_of_empty_set_is_none() {
        assert!(centroid(&[]).is_none());
    }

    #[test]
    fn centroid_rejects_mixed_dimensions() {
        assert!(centroid(&[p(&[1.0]), p(&[1.0, 2.0])]).is_none());
    }

    #[test]
    fn mean_abs_distance_error_is_zero_for_identical_matrices() {
        let pts = vec![p(&[0.0]), p(&[2.0]), p(&[5.0])];
        let d = squared_distance_matrix(&pts);
        assert!(mean_abs_distance_error(&d, &d).unwrap() < 1e-12);
    }

    #[test]
    fn mean_abs_distance_error_treats_negative_roundoff_as_zero() {
        let target = DMatrix::from_row_slice(2, 2, &[0.0, 4.0, 4.0, 0.0]);
        let noisy = DMatrix::from_row_slice(2, 2, &[0.0, -1e-14, -1e-14, 0.0]);
        let err = mean_abs_distance_error(&noisy, &target).unwrap();
        assert!((err - 2.0).abs() < 1e-12);
    }
}
