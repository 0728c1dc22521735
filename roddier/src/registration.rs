//! Geometric registration of an intra/extra-focal image pair.
//!
//! Registration runs in three steps:
//!
//! 1. [`align`] finds the integer translation that maximizes the circular
//!    cross-correlation of the two frames (computed as
//!    `ifft(F(a) · conj(F(b)))`) and applies it to the second frame.
//! 2. [`estimate_center_and_radii`] thresholds the averaged pair at a fraction
//!    of its peak, takes the intensity-weighted centroid of the selected
//!    pixels as the pupil centre, the largest centroid distance as the outer
//!    radius, and derives the inner radius from an [`ObstructionMode`].
//! 3. [`build_annular_mask`] turns the geometry into a boolean pupil mask.
//!
//! [`register`] chains the three and returns a [`RegistrationResult`].

use ndarray::{Array2, ArrayView2, Zip};
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::config::{ObstructionMode, RegistrationConfig};
use crate::error::{ensure_same_shape, Result, RoddierError};
use crate::fft::{fft2_real, ifft2};
use crate::image_proc::{compute_centroid_from_mask, gaussian_blur, shift_image, ShiftVector};

/// Pupil centre in pixel coordinates (`x` = column, `y` = row).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Center {
    pub x: f64,
    pub y: f64,
}

impl Center {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Distance from the centre to pixel `(row, col)`
    pub fn distance_to(&self, row: usize, col: usize) -> f64 {
        (col as f64 - self.x).hypot(row as f64 - self.y)
    }
}

/// Pupils whose second-moment axis ratio exceeds this are reported as elongated.
pub const MAX_ROUND_ELONGATION: f64 = 1.2;

/// Pupil centre with inner and outer radii, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PupilGeometry {
    pub center: Center,
    pub r_in: f64,
    pub r_out: f64,
    /// Axis ratio of the thresholded pupil's second moments, 1 when round
    pub elongation: f64,
}

impl PupilGeometry {
    /// True when vignetting or a strong tilt has stretched the pupil
    pub fn is_elongated(&self) -> bool {
        self.elongation > MAX_ROUND_ELONGATION
    }
}

/// Output of [`align`].
#[derive(Debug, Clone)]
pub struct Alignment {
    /// The moving frame after the shift was applied
    pub aligned: Array2<f64>,
    /// Shift applied to the moving frame
    pub shift: ShiftVector,
}

/// Everything registration knows about an image pair.
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    /// Intra-focal frame (unchanged)
    pub intra: Array2<f64>,
    /// Extra-focal frame shifted onto the intra-focal one
    pub extra: Array2<f64>,
    /// Shift applied to the extra-focal frame
    pub shift: ShiftVector,
    pub geometry: PupilGeometry,
    pub mask: Array2<bool>,
}

impl RegistrationResult {
    pub fn center(&self) -> Center {
        self.geometry.center
    }

    pub fn r_out(&self) -> f64 {
        self.geometry.r_out
    }

    pub fn r_in(&self) -> f64 {
        self.geometry.r_in
    }
}

fn wrap_index(index: usize, n: usize) -> f64 {
    if index > n / 2 {
        index as f64 - n as f64
    } else {
        index as f64
    }
}

/// Translate `moving` onto `reference` by maximizing their cross-correlation.
///
/// With `smoothing_sigma` both frames are Gaussian-smoothed before the
/// correlation (the returned frame is shifted from the unsmoothed input).
/// A flat or non-finite correlation surface yields a zero shift.
///
/// # Errors
/// * `ShapeMismatch` if the frames differ in shape
pub fn align(
    reference: &ArrayView2<f64>,
    moving: &ArrayView2<f64>,
    smoothing_sigma: Option<f64>,
) -> Result<Alignment> {
    ensure_same_shape("image to align", reference.dim(), moving.dim())?;
    let (rows, cols) = reference.dim();

    let (a, b) = match smoothing_sigma {
        Some(sigma) if sigma > 0.0 => (gaussian_blur(reference, sigma), gaussian_blur(moving, sigma)),
        _ => (reference.to_owned(), moving.to_owned()),
    };

    let spec_a = fft2_real(&a.view());
    let spec_b = fft2_real(&b.view());
    let mut product = Array2::<Complex64>::zeros((rows, cols));
    Zip::from(&mut product)
        .and(&spec_a)
        .and(&spec_b)
        .for_each(|p, &fa, &fb| *p = fa * fb.conj());
    let corr = ifft2(&product.view());

    let mut best = (0usize, 0usize);
    let mut max = f64::NEG_INFINITY;
    let mut min = f64::INFINITY;
    for ((r, c), value) in corr.indexed_iter() {
        let v = value.re;
        if v > max {
            max = v;
            best = (r, c);
        }
        min = min.min(v);
    }

    let flat = !(max.is_finite() && min.is_finite()) || (max - min) <= 1e-12 * max.abs().max(1.0);
    let shift = if flat {
        log::warn!("cross-correlation is flat, keeping frames unshifted");
        ShiftVector::default()
    } else {
        ShiftVector::new(wrap_index(best.0, rows), wrap_index(best.1, cols))
    };
    log::debug!("alignment shift dy={:.1} dx={:.1}", shift.dy, shift.dx);

    Ok(Alignment {
        aligned: shift_image(moving, shift),
        shift,
    })
}

/// Locate the pupil in `image` and measure its radii.
///
/// Pixels strictly brighter than `threshold_fraction × peak` form the pupil.
///
/// # Errors
/// * `DegeneratePupil` if the image has no positive peak or the selected
///   pixels have zero extent
pub fn estimate_center_and_radii(
    image: &ArrayView2<f64>,
    threshold_fraction: f64,
    obstruction: ObstructionMode,
) -> Result<PupilGeometry> {
    let peak = image.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(peak.is_finite() && peak > 0.0) {
        return Err(RoddierError::DegeneratePupil(format!(
            "image peak {peak} is not positive"
        )));
    }
    let threshold = threshold_fraction * peak;
    let selected = image.mapv(|v| v > threshold);

    let centroid = compute_centroid_from_mask(image, &selected.view())?.ok_or_else(|| {
        RoddierError::DegeneratePupil("no flux above the pupil threshold".into())
    })?;
    let center = Center::new(centroid.x, centroid.y);

    let mut r_out = 0.0f64;
    let mut r_min = f64::INFINITY;
    for ((row, col), &inside) in selected.indexed_iter() {
        if inside {
            let d = center.distance_to(row, col);
            r_out = r_out.max(d);
            r_min = r_min.min(d);
        }
    }
    if r_out <= 0.0 {
        return Err(RoddierError::DegeneratePupil(
            "thresholded pupil has zero radius".into(),
        ));
    }

    let r_in = match obstruction {
        ObstructionMode::Auto => r_min,
        ObstructionMode::Physical { ratio } => ratio * r_out,
    };
    let elongation = centroid.aspect_ratio();
    if elongation > MAX_ROUND_ELONGATION {
        log::warn!("pupil is elongated (axis ratio {elongation:.2}), check for vignetting");
    }
    log::debug!(
        "pupil centre ({:.2}, {:.2}), R_in {:.2}, R_out {:.2}, {} pixels",
        center.x,
        center.y,
        r_in,
        r_out,
        centroid.n_pixels
    );

    Ok(PupilGeometry {
        center,
        r_in,
        r_out,
        elongation,
    })
}

/// Boolean mask `r_in ≤ |p − center| ≤ r_out` over an array of `shape`.
///
/// # Errors
/// * `InvalidParameter` if `r_in > r_out` or a radius is not finite
/// * `EmptyMask` if no pixel falls inside the annulus
pub fn build_annular_mask(
    center: Center,
    r_in: f64,
    r_out: f64,
    shape: (usize, usize),
) -> Result<Array2<bool>> {
    if !(r_in.is_finite() && r_out.is_finite()) || r_in > r_out {
        return Err(RoddierError::InvalidParameter(format!(
            "annulus radii must satisfy R_in <= R_out, got {r_in} and {r_out}"
        )));
    }
    let mask = Array2::from_shape_fn(shape, |(row, col)| {
        let d = center.distance_to(row, col);
        d >= r_in && d <= r_out
    });
    if !mask.iter().any(|&m| m) {
        return Err(RoddierError::EmptyMask { r_in, r_out });
    }
    Ok(mask)
}

/// Align `extra` onto `intra`, then locate the pupil on their average.
///
/// # Errors
/// * `ShapeMismatch` if the frames differ in shape
/// * `DegeneratePupil` or `EmptyMask` if no usable pupil is found
pub fn register(
    intra: &ArrayView2<f64>,
    extra: &ArrayView2<f64>,
    config: &RegistrationConfig,
) -> Result<RegistrationResult> {
    let Alignment { aligned, shift } = align(intra, extra, config.smoothing_sigma)?;
    let averaged = (&intra.to_owned() + &aligned) * 0.5;
    let geometry =
        estimate_center_and_radii(&averaged.view(), config.threshold_fraction, config.obstruction)?;
    let mask = build_annular_mask(geometry.center, geometry.r_in, geometry.r_out, intra.dim())?;

    Ok(RegistrationResult {
        intra: intra.to_owned(),
        extra: aligned,
        shift,
        geometry,
        mask,
    })
}

/// Defocus distance (mm) that images the pupil with radius `r_px` pixels.
///
/// `dz = r_px · pixel_size_mm / tan(atan((aperture/2) / focal))`
pub fn estimate_defocus_mm(r_px: f64, pixel_size_mm: f64, focal_mm: f64, aperture_mm: f64) -> f64 {
    let theta = ((aperture_mm / 2.0) / focal_mm).atan();
    r_px * pixel_size_mm / theta.tan()
}

/// Inverse of [`estimate_defocus_mm`]: pupil radius in pixels at `defocus_mm`.
pub fn pupil_radius_px(defocus_mm: f64, pixel_size_mm: f64, focal_mm: f64, aperture_mm: f64) -> f64 {
    let theta = ((aperture_mm / 2.0) / focal_mm).atan();
    defocus_mm * theta.tan() / pixel_size_mm
}
