//! Forward model of a defocused pupil image pair.
//!
//! The irradiance-transport equation links the normalized intensity
//! difference to the Laplacian of the wavefront. The forward model uses
//! the same discrete spectral Laplacian the solver inverts:
//!
//! ```text
//! D     = ∇²_spectral(W / s),   s = (λ / 4π) · dz
//! intra = I₀ · (1 − D)
//! extra = I₀ · (1 + D)
//! ```
//!
//! so `(extra − intra) / (extra + intra) = D` wherever the pupil is lit, and
//! solving that difference over a fully lit frame returns `W` minus its mean.
//!
//! The wavefront is tapered to zero with a raised cosine between `1.1·R`
//! and `1.5·R`, which keeps the spectral Laplacian free of wrap-around
//! artifacts from the polynomial growth outside the pupil.

use ndarray::Array2;
use roddier::image_proc::{shift_image, ShiftVector};
use roddier::zernike::noll::zernike_value;
use roddier::zernike::{noll_normalization, noll_to_nm};
use roddier::{spectral_laplacian, PhysicalScale};
use serde::{Deserialize, Serialize};

use crate::{Result, SimError};

const TAPER_START: f64 = 1.1;
const TAPER_END: f64 = 1.5;

/// One Zernike term of the synthetic wavefront.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aberration {
    /// Noll index (1-based)
    pub noll: usize,
    /// Noll amplitude in waves RMS
    pub amplitude_waves: f64,
}

impl Aberration {
    pub fn new(noll: usize, amplitude_waves: f64) -> Self {
        Self {
            noll,
            amplitude_waves,
        }
    }
}

/// Which pixels receive light.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Illumination {
    /// Annular pupil `r_in ≤ r ≤ r_out` around the pupil centre
    Annulus { r_in: f64, r_out: f64 },
    /// Every pixel, as if the pupil filled the detector
    FullFrame,
}

/// Everything needed to synthesize a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairSpec {
    pub shape: (usize, usize),
    /// Pupil centre `(x, y)`; the array centre when `None`
    pub center: Option<(f64, f64)>,
    /// Radius (pixels) over which the Zernike terms are normalized
    pub pupil_radius: f64,
    pub illumination: Illumination,
    /// Mean irradiance `I₀` of the lit pixels
    pub intensity: f64,
    pub aberrations: Vec<Aberration>,
    pub wavelength_mm: f64,
    pub defocus_mm: f64,
    /// Extra pointing error applied to the extra-focal frame only
    pub extra_offset: ShiftVector,
}

impl PairSpec {
    /// Annular pupil of radius `r_out` centred in a square frame of side `size`.
    pub fn annular(size: usize, r_in: f64, r_out: f64, wavelength_mm: f64, defocus_mm: f64) -> Self {
        Self {
            shape: (size, size),
            center: None,
            pupil_radius: r_out,
            illumination: Illumination::Annulus { r_in, r_out },
            intensity: 1000.0,
            aberrations: Vec::new(),
            wavelength_mm,
            defocus_mm,
            extra_offset: ShiftVector::default(),
        }
    }

    pub fn with_aberrations(self, aberrations: Vec<Aberration>) -> Self {
        Self {
            aberrations,
            ..self
        }
    }

    pub fn with_extra_offset(self, extra_offset: ShiftVector) -> Self {
        Self {
            extra_offset,
            ..self
        }
    }

    fn center(&self) -> (f64, f64) {
        self.center
            .unwrap_or((self.shape.1 as f64 / 2.0, self.shape.0 as f64 / 2.0))
    }

    fn validate(&self) -> Result<()> {
        let (rows, cols) = self.shape;
        if rows == 0 || cols == 0 {
            return Err(SimError::InvalidParameter("frame has zero size".into()));
        }
        for (name, value) in [
            ("pupil_radius", self.pupil_radius),
            ("intensity", self.intensity),
            ("wavelength_mm", self.wavelength_mm),
            ("defocus_mm", self.defocus_mm),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::InvalidParameter(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if let Some(bad) = self.aberrations.iter().find(|a| a.noll == 0) {
            return Err(SimError::InvalidParameter(format!(
                "Noll indices start at 1, got {bad:?}"
            )));
        }
        Ok(())
    }
}

/// A synthesized pair with its ground truth.
#[derive(Debug, Clone)]
pub struct SyntheticPair {
    pub intra: Array2<f64>,
    pub extra: Array2<f64>,
    /// Wavefront in waves, tapered outside the pupil
    pub wavefront_waves: Array2<f64>,
    /// Lit pixels
    pub pupil: Array2<bool>,
    /// Pixels where `1 ± D` went negative and were clipped to zero
    pub clipped_pixels: usize,
}

fn taper(rho: f64) -> f64 {
    if rho <= TAPER_START {
        1.0
    } else if rho >= TAPER_END {
        0.0
    } else {
        let t = (rho - TAPER_START) / (TAPER_END - TAPER_START);
        0.5 * (1.0 + (std::f64::consts::PI * t).cos())
    }
}

/// Sum of Noll-normalized Zernike terms in waves, tapered outside the pupil.
///
/// # Errors
/// * `Roddier(InvalidParameter)` if an aberration has Noll index 0
pub fn wavefront_from_aberrations(
    shape: (usize, usize),
    center: (f64, f64),
    radius: f64,
    aberrations: &[Aberration],
) -> Result<Array2<f64>> {
    let (cx, cy) = center;
    let terms = aberrations
        .iter()
        .map(|a| {
            let (n, m) = noll_to_nm(a.noll)?;
            Ok((n, m, a.amplitude_waves * noll_normalization(n, m)))
        })
        .collect::<roddier::Result<Vec<(usize, i32, f64)>>>()?;
    Ok(Array2::from_shape_fn(shape, |(r, c)| {
        let dx = c as f64 - cx;
        let dy = r as f64 - cy;
        let rho = dx.hypot(dy) / radius;
        let weight = taper(rho);
        if weight == 0.0 {
            return 0.0;
        }
        let theta = dy.atan2(dx);
        let value: f64 = terms
            .iter()
            .map(|&(n, m, scale)| scale * zernike_value(n, m, rho, theta))
            .sum();
        weight * value
    }))
}

/// Synthesize an intra/extra-focal pair from `spec`.
///
/// # Errors
/// * `InvalidParameter` for non-positive sizes, intensities or distances
pub fn synthesize_pair(spec: &PairSpec) -> Result<SyntheticPair> {
    spec.validate()?;
    let center = spec.center();
    let wavefront_waves =
        wavefront_from_aberrations(spec.shape, center, spec.pupil_radius, &spec.aberrations)?;

    let scale = PhysicalScale::new(spec.wavelength_mm, spec.defocus_mm).factor();
    let raw = wavefront_waves.mapv(|w| w * spec.wavelength_mm / scale);
    let laplacian = spectral_laplacian(&raw.view());

    let (cx, cy) = center;
    let pupil = Array2::from_shape_fn(spec.shape, |(r, c)| match spec.illumination {
        Illumination::FullFrame => true,
        Illumination::Annulus { r_in, r_out } => {
            let d = (c as f64 - cx).hypot(r as f64 - cy);
            d >= r_in && d <= r_out
        }
    });

    let mut clipped_pixels = 0usize;
    let mut lit = |sign: f64| {
        Array2::from_shape_fn(spec.shape, |idx| {
            if !pupil[idx] {
                return 0.0;
            }
            let value = spec.intensity * (1.0 + sign * laplacian[idx]);
            if value < 0.0 {
                clipped_pixels += 1;
                0.0
            } else {
                value
            }
        })
    };
    let intra = lit(-1.0);
    let extra = lit(1.0);
    if clipped_pixels > 0 {
        log::warn!("{clipped_pixels} pixels clipped at zero irradiance, aberration too strong for the defocus");
    }

    let extra = if spec.extra_offset == ShiftVector::default() {
        extra
    } else {
        shift_image(&extra.view(), spec.extra_offset)
    };

    log::debug!(
        "synthesized {}x{} pair with {} aberration term(s)",
        spec.shape.0,
        spec.shape.1,
        spec.aberrations.len()
    );
    Ok(SyntheticPair {
        intra,
        extra,
        wavefront_waves,
        pupil,
        clipped_pixels,
    })
}

/// Two concentric Gaussian spots of width `sigma`, differing only in peak.
pub fn gaussian_spot_pair(
    shape: (usize, usize),
    sigma: f64,
    intra_peak: f64,
    extra_peak: f64,
) -> (Array2<f64>, Array2<f64>) {
    let cy = (shape.0 as f64 - 1.0) / 2.0;
    let cx = (shape.1 as f64 - 1.0) / 2.0;
    let profile = Array2::from_shape_fn(shape, |(r, c)| {
        let d2 = (r as f64 - cy).powi(2) + (c as f64 - cx).powi(2);
        (-d2 / (2.0 * sigma * sigma)).exp()
    });
    (profile.mapv(|v| v * intra_peak), profile.mapv(|v| v * extra_peak))
}
