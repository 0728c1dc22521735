//! Frequency-domain solution of the linearized irradiance-transport equation.
//!
//! The normalized intensity difference `ΔI/I₀` between the extra- and
//! intra-focal pupil images is proportional to the Laplacian of the
//! wavefront. In the Fourier domain the Laplacian is a multiplication by
//! `−|f|²`, so the wavefront spectrum is recovered by the division
//!
//! ```text
//! Ŵ(f) = D̂(f) / (−(fx² + fy²))
//! ```
//!
//! with `f` in cycles per pixel. The DC bin of `D̂` and every bin with
//! `|f|² ≤ 1e-8` are set to zero, so the result has zero mean over the grid
//! and never contains a non-finite value.
//!
//! When a [`PhysicalScale`] is supplied the raw map is multiplied by
//! `(λ/4π)·dz` (both in millimetres). The annular mask is applied last as a
//! 0/1 multiply, without any sign change.

use ndarray::{Array2, ArrayView2, Zip};
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_same_shape, Result};
use crate::fft::{fft2_real, frequency_squared_grid, ifft2};

/// Bins with squared frequency at or below this value are zeroed.
pub const FREQUENCY_EPSILON: f64 = 1.0e-8;

/// Wavelength and defocus distance used to scale the raw solver output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalScale {
    pub wavelength_mm: f64,
    pub defocus_mm: f64,
}

impl PhysicalScale {
    pub fn new(wavelength_mm: f64, defocus_mm: f64) -> Self {
        Self {
            wavelength_mm,
            defocus_mm,
        }
    }

    /// `(λ / 4π) · dz`
    pub fn factor(&self) -> f64 {
        self.wavelength_mm / (4.0 * std::f64::consts::PI) * self.defocus_mm
    }
}

/// Wavefront map together with the scale that produced it.
#[derive(Debug, Clone)]
pub struct WavefrontResult {
    /// Wavefront, zero outside the mask
    pub wavefront: Array2<f64>,
    /// Scale applied to the raw map, `None` for the unscaled solution
    pub scale: Option<PhysicalScale>,
}

/// Stateless Poisson solver for the Roddier equation.
///
/// Holds nothing but the frequency cutoff, so a single instance can be
/// reused across image pairs of any size.
#[derive(Debug, Clone, Copy)]
pub struct WavefrontSolver {
    frequency_epsilon: f64,
}

impl Default for WavefrontSolver {
    fn default() -> Self {
        Self {
            frequency_epsilon: FREQUENCY_EPSILON,
        }
    }
}

impl WavefrontSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solve for the wavefront behind `delta` (the normalized difference map).
    ///
    /// # Errors
    /// * `ShapeMismatch` if `mask` and `delta` differ in shape
    pub fn solve(
        &self,
        delta: &ArrayView2<f64>,
        mask: &ArrayView2<bool>,
        scale: Option<PhysicalScale>,
    ) -> Result<WavefrontResult> {
        ensure_same_shape("pupil mask", delta.dim(), mask.dim())?;
        let shape = delta.dim();
        if shape.0 == 0 || shape.1 == 0 {
            return Ok(WavefrontResult {
                wavefront: Array2::zeros(shape),
                scale,
            });
        }

        let mut spectrum = fft2_real(delta);
        spectrum[[0, 0]] = Complex64::new(0.0, 0.0);
        let freq_sq = frequency_squared_grid(shape);
        let eps = self.frequency_epsilon;
        Zip::from(&mut spectrum).and(&freq_sq).for_each(|s, &f2| {
            *s = if f2 > eps {
                *s / -f2
            } else {
                Complex64::new(0.0, 0.0)
            };
        });

        let factor = scale.map_or(1.0, |s| s.factor());
        let raw = ifft2(&spectrum.view());
        let mut wavefront = Array2::zeros(shape);
        Zip::from(&mut wavefront)
            .and(&raw)
            .and(mask)
            .for_each(|w, r, &inside| {
                *w = if inside { r.re * factor } else { 0.0 };
            });

        log::debug!(
            "solved {}x{} wavefront, scale factor {:.3e}",
            shape.0,
            shape.1,
            factor
        );
        Ok(WavefrontResult { wavefront, scale })
    }
}

/// Discrete Laplacian `ifft(−|f|²·fft(w))` consistent with [`WavefrontSolver`].
///
/// Applying the solver to this map recovers `w` minus its mean on the
/// full grid, which makes it the forward model for synthetic image pairs.
pub fn spectral_laplacian(wavefront: &ArrayView2<f64>) -> Array2<f64> {
    let shape = wavefront.dim();
    let mut spectrum = fft2_real(wavefront);
    let freq_sq = frequency_squared_grid(shape);
    Zip::from(&mut spectrum)
        .and(&freq_sq)
        .for_each(|s, &f2| *s = *s * -f2);
    ifft2(&spectrum.view()).mapv(|c| c.re)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_zero_input_gives_zero_output() {
        let delta = Array2::<f64>::zeros((32, 24));
        let mask = Array2::from_elem((32, 24), true);
        let result = WavefrontSolver::new()
            .solve(&delta.view(), &mask.view(), Some(PhysicalScale::new(5.55e-4, 2.0)))
            .unwrap();
        assert_eq!(result.wavefront.dim(), (32, 24));
        assert!(result.wavefront.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_empty_mask_gives_zero_output() {
        let delta = Array2::from_shape_fn((16, 16), |(r, c)| (r as f64 - c as f64) * 0.01);
        let mask = Array2::from_elem((16, 16), false);
        let result = WavefrontSolver::new()
            .solve(&delta.view(), &mask.view(), None)
            .unwrap();
        assert!(result.wavefront.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_inverts_spectral_laplacian() {
        let shape = (32, 32);
        let w = Array2::from_shape_fn(shape, |(r, c)| {
            let y = r as f64 / 32.0 * std::f64::consts::TAU;
            let x = c as f64 / 32.0 * std::f64::consts::TAU;
            y.sin() * 0.3 + (2.0 * x).cos() * 0.5 + 1.0
        });
        let d = spectral_laplacian(&w.view());
        let mask = Array2::from_elem(shape, true);
        let result = WavefrontSolver::new()
            .solve(&d.view(), &mask.view(), None)
            .unwrap();
        let mean = w.mean().unwrap();
        for (got, want) in result.wavefront.iter().zip(w.iter()) {
            assert_abs_diff_eq!(*got, want - mean, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_scale_factor() {
        let scale = PhysicalScale::new(4.0 * std::f64::consts::PI, 0.5);
        assert_abs_diff_eq!(scale.factor(), 0.5, epsilon = 1e-15);
    }

    #[test]
    fn test_shape_mismatch() {
        let delta = Array2::<f64>::zeros((8, 8));
        let mask = Array2::from_elem((8, 9), true);
        assert!(WavefrontSolver::new()
            .solve(&delta.view(), &mask.view(), None)
            .is_err());
    }
}
