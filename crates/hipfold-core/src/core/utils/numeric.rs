/// Default tolerance below which a denominator is treated as zero.
pub const DEFAULT_DIV_TOLERANCE: f64 = 1e-12;

/// Divides `num` by `den`, returning `fallback` when `|den| <= tol`.
///
/// Replaces ad-hoc division-by-zero guards throughout the engine so that
/// degenerate geometry (zero-length axes, coincident centroids) yields a
/// conservative value instead of `NaN` or `inf`.
#[inline]
pub fn safe_div(num: f64, den: f64, tol: f64, fallback: f64) -> f64 {
    if den.abs() <= tol || !den.is_finite() {
        fallback
    } else {
        num / den
    }
}

/// Computes `sqrt(a² + b²)` without destructive underflow or overflow.
///
/// Values whose magnitude is below `tol` are treated as zero.
#[inline]
pub fn pythag(a: f64, b: f64, tol: f64) -> f64 {
    let abs_a = a.abs();
    let abs_b = b.abs();
    let (big, small) = if abs_a >= abs_b {
        (abs_a, abs_b)
    } else {
        (abs_b, abs_a)
    };
    if big <= tol {
        return 0.0;
    }
    let ratio = small / big;
    big * (1.0 + ratio * ratio).sqrt()
}

/// Square root that clamps small negative round-off to zero.
#[inline]
pub fn sqrt_clamped(value: f64) -> f64 {
    if value > 0.0 { value.sqrt() } else { 0.0 }
}
