//! Synthetic pupils and comparison helpers.
//!
//! Centres are `(cx, cy)` in pixel coordinates, arrays are indexed `[row, col]`.

use ndarray::Array2;

/// Disk `|p − c| ≤ radius`
pub fn circular_mask(shape: (usize, usize), center: (f64, f64), radius: f64) -> Array2<bool> {
    annular_mask(shape, center, 0.0, radius)
}

/// Annulus `r_in ≤ |p − c| ≤ r_out`
pub fn annular_mask(
    shape: (usize, usize),
    center: (f64, f64),
    r_in: f64,
    r_out: f64,
) -> Array2<bool> {
    let (cx, cy) = center;
    Array2::from_shape_fn(shape, |(r, c)| {
        let d = (c as f64 - cx).hypot(r as f64 - cy);
        d >= r_in && d <= r_out
    })
}

/// `amplitude · exp(−|p − c|² / 2σ²)`
pub fn gaussian_spot(
    shape: (usize, usize),
    center: (f64, f64),
    sigma: f64,
    amplitude: f64,
) -> Array2<f64> {
    let (cx, cy) = center;
    Array2::from_shape_fn(shape, |(r, c)| {
        let d2 = (c as f64 - cx).powi(2) + (r as f64 - cy).powi(2);
        amplitude * (-d2 / (2.0 * sigma * sigma)).exp()
    })
}

/// Normalized radius and angle `(ρ, θ)` with `ρ = |p − c| / radius`.
pub fn unit_polar(
    shape: (usize, usize),
    center: (f64, f64),
    radius: f64,
) -> (Array2<f64>, Array2<f64>) {
    let (cx, cy) = center;
    let rho = Array2::from_shape_fn(shape, |(r, c)| {
        (c as f64 - cx).hypot(r as f64 - cy) / radius
    });
    let theta = Array2::from_shape_fn(shape, |(r, c)| (r as f64 - cy).atan2(c as f64 - cx));
    (rho, theta)
}

/// Largest absolute element-wise difference.
///
/// # Panics
/// * If the arrays differ in shape
pub fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    assert_eq!(a.dim(), b.dim(), "arrays must have the same shape");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// Panic with the first offending index if `values` holds NaN or ±∞.
pub fn assert_all_finite(values: &Array2<f64>, what: &str) {
    if let Some(((r, c), v)) = values.indexed_iter().find(|(_, v)| !v.is_finite()) {
        panic!("{what} has non-finite value {v} at [{r}, {c}]");
    }
}
