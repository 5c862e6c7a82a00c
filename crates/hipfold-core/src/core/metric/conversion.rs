use nalgebra::{DMatrix, DVector};
use tracing::{trace, warn};

/// Squared distances of every point from the (optionally mass-weighted)
/// centroid, together with the number of negative entries found.
#[derive(Debug, Clone, PartialEq)]
pub struct CentreDistances {
    pub sqdist: DVector<f64>,
    /// Entries below zero; non-zero means the input is not Euclidean.
    pub negative: usize,
}

/// Squared centroid distances from a squared-distance matrix by Lagrange's
/// theorem:
///
/// `d²(i, o) = Σⱼ wⱼ d²(i, j) / W − Σⱼ Σₖ wⱼ wₖ d²(j, k) / (2 W²)`.
///
/// `weights` of the wrong length, or with a non-positive sum, fall back to
/// uniform masses.
pub fn centre_dist(dist: &DMatrix<f64>, weights: Option<&[f64]>) -> CentreDistances {
    let n = dist.nrows();
    if n == 0 || dist.ncols() != n {
        if dist.ncols() != n {
            warn!(
                rows = n,
                cols = dist.ncols(),
                "Squared-distance matrix is not square; returning empty centroid distances."
            );
        }
        return CentreDistances {
            sqdist: DVector::zeros(0),
            negative: 0,
        };
    }

    let uniform = vec![1.0; n];
    let masses = match weights {
        Some(w) if w.len() == n && w.iter().sum::<f64>() > 0.0 => w,
        Some(w) => {
            warn!(
                expected = n,
                found = w.len(),
                "Ignoring unusable centroid weights; using uniform masses."
            );
            &uniform[..]
        }
        None => &uniform[..],
    };
    let total: f64 = masses.iter().sum();

    let weighted_rows: Vec<f64> = (0..n)
        .map(|i| (0..n).map(|j| masses[j] * dist[(i, j)]).sum::<f64>())
        .collect();
    let grand: f64 = (0..n).map(|j| masses[j] * weighted_rows[j]).sum();
    let offset = grand / (2.0 * total * total);

    let sqdist = DVector::from_iterator(n, weighted_rows.iter().map(|r| r / total - offset));
    let negative = sqdist.iter().filter(|&&d| d < 0.0).count();
    if negative > 0 {
        warn!(
            negative,
            points = n,
            "Negative squared centroid distances: the distance matrix is not Euclidean."
        );
    }
    trace!(points = n, "Computed centroid distances.");
    CentreDistances { sqdist, negative }
}

/// Gram matrix about the centroid: `g(i, j) = (d²(i, o) + d²(j, o) − d²(i, j)) / 2`.
pub fn dist_metric(dist: &DMatrix<f64>, centre: &DVector<f64>) -> DMatrix<f64> {
    let n = dist.nrows();
    if dist.ncols() != n || centre.len() != n {
        warn!(
            rows = n,
            cols = dist.ncols(),
            centre = centre.len(),
            "Size mismatch converting distances to a metric; returning zero matrix."
        );
        return DMatrix::zeros(n, n);
    }
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            centre[i]
        } else {
            0.5 * (centre[i] + centre[j] - dist[(i, j)])
        }
    })
}

/// Squared distances from a Gram matrix: `d²(i, j) = g(i, i) + g(j, j) − 2 g(i, j)`.
pub fn metric_dist(metric: &DMatrix<f64>) -> DMatrix<f64> {
    let n = metric.nrows();
    if metric.ncols() != n {
        warn!(
            rows = n,
            cols = metric.ncols(),
            "Metric matrix is not square; returning zero matrix."
        );
        return DMatrix::zeros(n, n);
    }
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            0.0
        } else {
            metric[(i, i)] + metric[(j, j)] - 2.0 * metric[(i, j)]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utils::geometry::squared_distance_matrix;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    const TOLERANCE: f64 = 1e-9;

    fn random_centered_points(n: usize, dim: usize, seed: u64) -> Vec<DVector<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let pts: Vec<DVector<f64>> = (0..n)
            .map(|_| DVector::from_fn(dim, |_, _| rng.gen_range(-5.0..5.0)))
            .collect();
        let c = pts.iter().fold(DVector::zeros(dim), |acc, p| acc + p) / n as f64;
        pts.into_iter().map(|p| p - &c).collect()
    }

    fn gram(points: &[DVector<f64>]) -> DMatrix<f64> {
        DMatrix::from_fn(points.len(), points.len(), |i, j| points[i].dot(&points[j]))
    }

    fn line(values: &[f64]) -> DMatrix<f64> {
        let pts: Vec<_> = values.iter().map(|&v| DVector::from_column_slice(&[v])).collect();
        squared_distance_matrix(&pts)
    }

    #[test]
    fn centre_dist_of_collinear_points() {
        let c = centre_dist(&line(&[0.0, 1.0, 2.0, 3.0]), None);
        let expected = [2.25, 0.25, 0.25, 2.25];
        for (got, want) in c.sqdist.iter().zip(expected) {
            assert!((got - want).abs() < TOLERANCE);
        }
        assert_eq!(c.negative, 0);
    }

    #[test]
    fn centre_dist_honours_masses() {
        let c = centre_dist(&line(&[0.0, 1.0, 2.0, 3.0]), Some(&[3.0, 1.0, 0.0, 0.0]));
        let expected = [0.0625, 0.5625, 3.0625, 7.5625];
        for (got, want) in c.sqdist.iter().zip(expected) {
            assert!((got - want).abs() < TOLERANCE);
        }
    }

    #[test]
    fn centre_dist_ignores_weights_of_wrong_length() {
        let d = line(&[0.0, 2.0]);
        let c = centre_dist(&d, Some(&[1.0]));
        assert!((c.sqdist[0] - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn centre_dist_flags_non_euclidean_input() {
        let d = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 1.0, 1.0, 0.0, 100.0, 1.0, 100.0, 0.0]);
        let c = centre_dist(&d, None);
        assert!(c.negative >= 1);
    }

    #[test]
    fn metric_round_trip_from_distances() {
        let pts = random_centered_points(12, 3, 7);
        let d = squared_distance_matrix(&pts);
        let centre = centre_dist(&d, None);
        let back = metric_dist(&dist_metric(&d, &centre.sqdist));
        assert!((back - d).norm() < 1e-8);
    }

    #[test]
    fn metric_round_trip_from_gram_matrix() {
        let pts = random_centered_points(10, 4, 21);
        let g = gram(&pts);
        let d = metric_dist(&g);
        let centre = centre_dist(&d, None);
        let back = dist_metric(&d, &centre.sqdist);
        assert!((back - g).norm() < 1e-8);
    }

    #[test]
    fn dist_metric_with_mismatched_centre_returns_zeros() {
        let d = line(&[0.0, 1.0, 2.0]);
        let m = dist_metric(&d, &DVector::zeros(2));
        assert_eq!(m, DMatrix::zeros(3, 3));
    }
}
