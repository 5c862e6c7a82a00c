use super::{LinalgError, Svd};
use nalgebra::{DMatrix, DVector};

/// Relative singular-value size below which the fit cannot tell a proper
/// rotation from its mirror image.
const HANDEDNESS_TOLERANCE: f64 = 1e-9;

/// Result of a weighted optimal rotation fit.
#[derive(Debug, Clone)]
pub struct RotationFit {
    /// The optimal orthogonal transform; may contain a reflection.
    pub rotation: DMatrix<f64>,
    /// The best transform restricted to determinant +1.
    pub proper_rotation: DMatrix<f64>,
    /// Whether `rotation` itself has determinant +1.
    pub proper: bool,
    /// Weighted RMS residual achieved by `rotation`.
    pub rms: f64,
}

impl RotationFit {
    fn identity(dim: usize, rms: f64) -> Self {
        let eye = DMatrix::identity(dim, dim);
        Self {
            rotation: eye.clone(),
            proper_rotation: eye,
            proper: true,
            rms,
        }
    }
}

/// Finds the orthogonal `R` minimising `Σ wᵢ |R xᵢ − yᵢ|²`.
///
/// Both point sets must already be expressed relative to the desired centre
/// of rotation; no translation is fitted. Negative weights are treated as
/// zero. When all weights vanish the identity is returned.
pub fn best_rotation(
    x: &[DVector<f64>],
    y: &[DVector<f64>],
    weights: &[f64],
) -> Result<RotationFit, LinalgError> {
    if x.is_empty() {
        return Err(LinalgError::Empty);
    }
    if x.len() != y.len() {
        return Err(LinalgError::DimensionMismatch {
            expected: x.len(),
            found: y.len(),
        });
    }
    if weights.len() != x.len() {
        return Err(LinalgError::DimensionMismatch {
            expected: x.len(),
            found: weights.len(),
        });
    }
    let dim = x[0].len();
    if let Some(bad) = x.iter().chain(y.iter()).find(|p| p.len() != dim) {
        return Err(LinalgError::DimensionMismatch {
            expected: dim,
            found: bad.len(),
        });
    }
    if dim == 0 {
        return Err(LinalgError::Empty);
    }

    let mut h = DMatrix::zeros(dim, dim);
    let mut weight_sum = 0.0;
    for ((xi, yi), &w) in x.iter().zip(y.iter()).zip(weights.iter()) {
        let w = w.max(0.0);
        if w == 0.0 {
            continue;
        }
        weight_sum += w;
        h += yi * xi.transpose() * w;
    }
    if weight_sum <= 0.0 {
        let rms = weighted_rms(&DMatrix::identity(dim, dim), x, y, &vec![1.0; x.len()]);
        return Ok(RotationFit::identity(dim, rms));
    }

    let svd = Svd::new(&h)?;
    let rotation = &svd.u * svd.v.transpose();
    let det = rotation.determinant();

    let (smallest, w_smallest) = svd
        .w
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |acc, (i, &w)| if w < acc.1 { (i, w) } else { acc });
    let w_largest = svd.w.iter().cloned().fold(0.0, f64::max);

    let (rotation, proper_rotation, proper) = if det >= 0.0 {
        (rotation.clone(), rotation, true)
    } else {
        let mut flip = DMatrix::identity(dim, dim);
        flip[(smallest, smallest)] = -1.0;
        let corrected = &svd.u * flip * svd.v.transpose();
        if w_smallest <= HANDEDNESS_TOLERANCE * w_largest {
            // A zero singular direction makes the mirror free of cost.
            (corrected.clone(), corrected, true)
        } else {
            (rotation, corrected, false)
        }
    };

    let rms = weighted_rms(&rotation, x, y, weights);
    Ok(RotationFit {
        rotation,
        proper_rotation,
        proper,
        rms,
    })
}

fn weighted_rms(r: &DMatrix<f64>, x: &[DVector<f64>], y: &[DVector<f64>], weights: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut weight_sum = 0.0;
    for ((xi, yi), &w) in x.iter().zip(y.iter()).zip(weights.iter()) {
        let w = w.max(0.0);
        sum += w * (r * xi - yi).norm_squared();
        weight_sum += w;
    }
    if weight_sum > 0.0 {
        (sum / weight_sum).sqrt()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;

    fn v(c: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(c)
    }

    fn frame() -> Vec<DVector<f64>> {
        vec![
            v(&[1.0, 0.0, 0.0]),
            v(&[0.0, 2.0, 0.0]),
            v(&[0.0, 0.0, 3.0]),
            v(&[1.0, 1.0, 1.0]),
        ]
    }

    #[test]
    fn best_rotation_recovers_known_proper_rotation() {
        let rot = Rotation3::from_euler_angles(0.3, -0.7, 1.1);
        let r = DMatrix::from_column_slice(3, 3, rot.matrix().as_slice());
        let x = frame();
        let y: Vec<_> = x.iter().map(|p| &r * p).collect();
        let fit = best_rotation(&x, &y, &[1.0; 4]).unwrap();
        assert!(fit.proper);
        assert!(fit.rms < 1e-10);
        assert!((fit.rotation - r).norm() < 1e-10);
    }

    #[test]
    fn best_rotation_reports_mirror_images_as_improper() {
        let x = frame();
        let y: Vec<_> = x.iter().map(|p| v(&[p[0], p[1], -p[2]])).collect();
        let fit = best_rotation(&x, &y, &[1.0; 4]).unwrap();
        assert!(!fit.proper);
        assert!(fit.rms < 1e-10);
        assert!((fit.rotation.determinant() + 1.0).abs() < 1e-10);
        assert!((fit.proper_rotation.determinant() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn best_rotation_of_planar_sets_is_always_proper() {
        let x = vec![v(&[1.0, 0.0, 0.0]), v(&[0.0, 1.0, 0.0])];
        let y = vec![v(&[0.0, 1.0, 0.0]), v(&[1.0, 0.0, 0.0])];
        let fit = best_rotation(&x, &y, &[1.0, 1.0]).unwrap();
        assert!(fit.proper);
        assert!(fit.rms < 1e-10);
        assert!((fit.rotation.determinant() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn best_rotation_with_zero_weights_returns_identity() {
        let x = frame();
        let fit = best_rotation(&x, &x, &[0.0; 4]).unwrap();
        assert!((fit.rotation - DMatrix::<f64>::identity(3, 3)).norm() < 1e-12);
        assert!(fit.proper);
    }

    #[test]
    fn best_rotation_rejects_mismatched_inputs() {
        let x = frame();
        assert!(matches!(
            best_rotation(&x, &x[..2], &[1.0; 4]),
            Err(LinalgError::DimensionMismatch { .. })
        ));
        assert!(matches!(best_rotation(&[], &[], &[]), Err(LinalgError::Empty)));
    }

    #[test]
    fn best_rotation_works_in_higher_dimensions() {
        let x: Vec<_> = (0..5)
            .map(|i| {
                let mut p = DVector::zeros(5);
                p[i] = 1.0 + i as f64;
                p
            })
            .collect();
        let mut perm = DMatrix::zeros(5, 5);
        for i in 0..5 {
            perm[((i + 1) % 5, i)] = 1.0;
        }
        let y: Vec<_> = x.iter().map(|p| &perm * p).collect();
        let fit = best_rotation(&x, &y, &[1.0; 5]).unwrap();
        assert!(fit.rms < 1e-10);
        assert!(fit.proper);
    }
}
