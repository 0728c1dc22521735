//! Simulated two-beam interferogram.

use ndarray::{Array2, ArrayView2, Zip};
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_same_shape, Result, RoddierError};

/// Reference beam settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterferogramOptions {
    /// Carrier tilt in fringes across the normalized `[-1, 1]` aperture
    pub reference_frequency: f64,
    /// Reference beam intensity; the field amplitude is its square root
    pub reference_intensity: f64,
    /// Stretch the result to `[0, 1]`
    pub rescale: bool,
}

impl Default for InterferogramOptions {
    fn default() -> Self {
        Self {
            reference_frequency: 0.0,
            reference_intensity: 1.0,
            rescale: true,
        }
    }
}

fn linspace_unit(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|i| -1.0 + 2.0 * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

/// Fringe intensity `|exp(i·φ) + sqrt(I_ref)|²` with `φ = 2π·W + carrier`.
///
/// `wavefront` is in waves. The carrier is `2π·f·(X + Y)/2` on a
/// `[-1, 1]` grid. Pixels outside `mask` are 0.
///
/// # Errors
/// * `ShapeMismatch` if `mask` and `wavefront` differ in shape
/// * `InvalidParameter` for a negative or non-finite reference intensity
pub fn calculate_interferogram(
    wavefront: &ArrayView2<f64>,
    mask: &ArrayView2<bool>,
    options: &InterferogramOptions,
) -> Result<Array2<f64>> {
    ensure_same_shape("interferogram mask", wavefront.dim(), mask.dim())?;
    if !(options.reference_intensity.is_finite() && options.reference_intensity >= 0.0) {
        return Err(RoddierError::InvalidParameter(format!(
            "reference intensity must be non-negative, got {}",
            options.reference_intensity
        )));
    }
    let (rows, cols) = wavefront.dim();
    let ys = linspace_unit(rows);
    let xs = linspace_unit(cols);
    let reference = Complex64::new(options.reference_intensity.sqrt(), 0.0);
    let tau = std::f64::consts::TAU;

    let mut fringes = Array2::zeros((rows, cols));
    Zip::indexed(&mut fringes)
        .and(wavefront)
        .and(mask)
        .for_each(|(r, c), out, &w, &inside| {
            if !inside || !w.is_finite() {
                *out = 0.0;
                return;
            }
            let carrier = tau * options.reference_frequency * (xs[c] + ys[r]) / 2.0;
            let field = Complex64::from_polar(1.0, tau * w + carrier);
            *out = (field + reference).norm_sqr();
        });

    if options.rescale {
        let (lo, hi) = fringes
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let span = hi - lo;
        if span > 0.0 && span.is_finite() {
            fringes.mapv_inplace(|v| (v - lo) / span);
        }
    }
    Ok(fringes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_flat_wavefront_is_bright() {
        let wavefront = Array2::<f64>::zeros((8, 8));
        let mask = Array2::from_elem((8, 8), true);
        let options = InterferogramOptions {
            rescale: false,
            ..InterferogramOptions::default()
        };
        let fringes = calculate_interferogram(&wavefront.view(), &mask.view(), &options).unwrap();
        assert!(fringes.iter().all(|&v| (v - 4.0).abs() < 1e-12));
    }

    #[test]
    fn test_half_wave_is_dark() {
        let wavefront = Array2::from_elem((4, 4), 0.5);
        let mask = Array2::from_elem((4, 4), true);
        let options = InterferogramOptions {
            rescale: false,
            ..InterferogramOptions::default()
        };
        let fringes = calculate_interferogram(&wavefront.view(), &mask.view(), &options).unwrap();
        for v in fringes.iter() {
            assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_outside_mask_is_zero_and_rescaled() {
        let wavefront = Array2::from_shape_fn((16, 16), |(r, c)| (r * c) as f64 * 0.01);
        let mask = Array2::from_shape_fn((16, 16), |(r, _)| r < 12);
        let options = InterferogramOptions {
            reference_frequency: 3.0,
            ..InterferogramOptions::default()
        };
        let fringes = calculate_interferogram(&wavefront.view(), &mask.view(), &options).unwrap();
        assert_eq!(fringes.dim(), (16, 16));
        assert!(fringes.iter().all(|v| v.is_finite() && *v >= 0.0 && *v <= 1.0));
        assert_eq!(fringes[[14, 3]], 0.0);
    }

    #[test]
    fn test_negative_reference_rejected() {
        let wavefront = Array2::<f64>::zeros((4, 4));
        let mask = Array2::from_elem((4, 4), true);
        let options = InterferogramOptions {
            reference_intensity: -1.0,
            ..InterferogramOptions::default()
        };
        assert!(calculate_interferogram(&wavefront.view(), &mask.view(), &options).is_err());
    }
}
