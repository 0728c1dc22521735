//! Point-spread function of an aberrated pupil.

use ndarray::{Array2, ArrayView2, Zip};
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_same_shape, Result};
use crate::fft::{fft2, fftshift, ifftshift};

/// Added before taking the logarithm so dark pixels stay finite.
pub const PSF_LOG_EPSILON: f64 = 1.0e-8;

/// How the PSF intensity is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PsfNormalization {
    /// Unit total energy
    #[default]
    Sum,
    /// Unit peak
    Peak,
}

/// PSF settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PsfOptions {
    pub normalization: PsfNormalization,
    /// Multiplies the wavefront before it becomes a phase in waves
    /// (1.0 when the wavefront is already in waves)
    pub phase_scale: f64,
}

impl Default for PsfOptions {
    fn default() -> Self {
        Self {
            normalization: PsfNormalization::Sum,
            phase_scale: 1.0,
        }
    }
}

/// Normalized PSF, its log10 for display and the Strehl estimate.
#[derive(Debug, Clone)]
pub struct PsfResult {
    pub psf: Array2<f64>,
    /// `log10(psf + 1e-8)`
    pub psf_log: Array2<f64>,
    /// Aberrated peak over the peak of the same pupil without aberration
    pub strehl_ratio: f64,
}

fn focal_intensity(pupil: &Array2<Complex64>) -> Array2<f64> {
    let centered = ifftshift(&pupil.view());
    let field = fftshift(&fft2(&centered.view()).view());
    field.mapv(|e| e.norm_sqr())
}

fn peak(values: &Array2<f64>) -> f64 {
    values.iter().copied().fold(0.0, f64::max)
}

/// Far-field intensity of `mask · exp(i·2π·W·phase_scale)`.
///
/// The zero frequency sits at `(rows/2, cols/2)`.
///
/// # Errors
/// * `ShapeMismatch` if `mask` and `wavefront` differ in shape
pub fn calculate_psf(
    wavefront: &ArrayView2<f64>,
    mask: &ArrayView2<bool>,
    options: &PsfOptions,
) -> Result<PsfResult> {
    ensure_same_shape("PSF mask", wavefront.dim(), mask.dim())?;
    let tau = std::f64::consts::TAU;

    let mut pupil = Array2::<Complex64>::zeros(wavefront.dim());
    let mut ideal = Array2::<Complex64>::zeros(wavefront.dim());
    Zip::from(&mut pupil)
        .and(&mut ideal)
        .and(wavefront)
        .and(mask)
        .for_each(|p, i, &w, &inside| {
            if inside && w.is_finite() {
                *p = Complex64::from_polar(1.0, tau * w * options.phase_scale);
                *i = Complex64::new(1.0, 0.0);
            }
        });

    let mut psf = focal_intensity(&pupil);
    let ideal_peak = peak(&focal_intensity(&ideal));
    let aberrated_peak = peak(&psf);
    let strehl_ratio = if ideal_peak > 0.0 {
        aberrated_peak / ideal_peak
    } else {
        0.0
    };

    let denominator = match options.normalization {
        PsfNormalization::Sum => psf.sum(),
        PsfNormalization::Peak => aberrated_peak,
    };
    if denominator > 0.0 {
        psf.mapv_inplace(|v| v / denominator);
    }
    let psf_log = psf.mapv(|v| (v + PSF_LOG_EPSILON).log10());

    log::debug!("PSF computed, Strehl {strehl_ratio:.4}");
    Ok(PsfResult {
        psf,
        psf_log,
        strehl_ratio,
    })
}
