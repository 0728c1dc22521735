//! Preparation of raw intra/extra-focal frames before registration.

use ndarray::{s, Array2, ArrayView2};

use super::centroid::compute_centroid_from_mask;
use super::convolve2d::gaussian_blur;
use super::shift::{shift_image, ShiftVector};
use crate::config::PreprocessConfig;
use crate::error::{ensure_same_shape, Result, RoddierError};

/// Scale the extra-focal frame so both frames carry the same total flux.
///
/// # Errors
/// * `ShapeMismatch` if the frames differ in shape
/// * `DegeneratePupil` if the extra-focal frame sums to zero
pub fn normalize_energy(
    intra: &ArrayView2<f64>,
    extra: &ArrayView2<f64>,
) -> Result<(Array2<f64>, Array2<f64>)> {
    ensure_same_shape("extra-focal image", intra.dim(), extra.dim())?;
    let sum_intra = intra.sum();
    let sum_extra = extra.sum();
    if sum_extra == 0.0 {
        return Err(RoddierError::DegeneratePupil(
            "extra-focal image has zero total flux".into(),
        ));
    }
    let scale = sum_intra / sum_extra;
    Ok((intra.to_owned(), extra.mapv(|v| v * scale)))
}

/// Square crop of side `size` around the array centre.
///
/// # Errors
/// * `InvalidParameter` if `size` is zero or larger than either dimension
pub fn crop_center(image: &ArrayView2<f64>, size: usize) -> Result<Array2<f64>> {
    let (rows, cols) = image.dim();
    if size == 0 || size > rows || size > cols {
        return Err(RoddierError::InvalidParameter(format!(
            "crop size {size} does not fit a {rows}x{cols} image"
        )));
    }
    let top = rows / 2 - size / 2;
    let left = cols / 2 - size / 2;
    let top = top.min(rows - size);
    let left = left.min(cols - size);
    Ok(image.slice(s![top..top + size, left..left + size]).to_owned())
}

/// Smooth, normalize to unit peak and zero everything below
/// `threshold_ratio` of the peak.
///
/// An all-zero (or non-positive) image is returned unchanged.
pub fn filter_noise(image: &ArrayView2<f64>, sigma: f64, threshold_ratio: f64) -> Array2<f64> {
    let smoothed = gaussian_blur(image, sigma);
    let peak = smoothed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(peak.is_finite() && peak > 0.0) {
        return smoothed;
    }
    smoothed.mapv(|v| {
        let normalized = v / peak;
        if normalized > threshold_ratio {
            normalized
        } else {
            0.0
        }
    })
}

/// Shift `image` so the intensity centroid inside `mask` lands on the
/// geometric centre `((rows−1)/2, (cols−1)/2)` of the array.
///
/// # Errors
/// * `ShapeMismatch` if image and mask differ in shape
/// * `DegeneratePupil` if the mask selects no flux
pub fn center_image(image: &ArrayView2<f64>, mask: &ArrayView2<bool>) -> Result<Array2<f64>> {
    ensure_same_shape("centering mask", image.dim(), mask.dim())?;
    let centroid = compute_centroid_from_mask(image, mask)?.ok_or_else(|| {
        RoddierError::DegeneratePupil("no flux inside the centering mask".into())
    })?;
    let (rows, cols) = image.dim();
    let target_y = (rows as f64 - 1.0) / 2.0;
    let target_x = (cols as f64 - 1.0) / 2.0;
    let shift = ShiftVector::new(target_y - centroid.y, target_x - centroid.x);
    log::debug!(
        "centering image: centroid ({:.2}, {:.2}) -> shift {:?}",
        centroid.x,
        centroid.y,
        shift
    );
    Ok(shift_image(image, shift))
}

/// Apply the enabled [`PreprocessConfig`] steps to both frames.
///
/// Centering selects the pupil as pixels above `threshold_fraction` of each
/// frame's peak. With every step disabled the frames are returned as copies.
///
/// # Errors
/// * `ShapeMismatch` if the frames differ in shape
/// * `InvalidParameter` if the crop does not fit the frames
/// * `DegeneratePupil` if energy normalization or centering finds no flux
pub fn preprocess_pair(
    intra: &ArrayView2<f64>,
    extra: &ArrayView2<f64>,
    config: &PreprocessConfig,
    threshold_fraction: f64,
) -> Result<(Array2<f64>, Array2<f64>)> {
    ensure_same_shape("extra-focal image", intra.dim(), extra.dim())?;
    let (mut intra, mut extra) = match config.crop_size {
        Some(size) => (crop_center(intra, size)?, crop_center(extra, size)?),
        None => (intra.to_owned(), extra.to_owned()),
    };

    if let Some(filter) = config.noise_filter {
        intra = filter_noise(&intra.view(), filter.sigma, filter.threshold_ratio);
        extra = filter_noise(&extra.view(), filter.sigma, filter.threshold_ratio);
    }

    if config.normalize_energy {
        (intra, extra) = normalize_energy(&intra.view(), &extra.view())?;
    }

    if config.center {
        let center = |image: &Array2<f64>| -> Result<Array2<f64>> {
            let peak = image.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mask = image.mapv(|v| v > threshold_fraction * peak);
            center_image(&image.view(), &mask.view())
        };
        intra = center(&intra)?;
        extra = center(&extra)?;
    }

    if !config.is_identity() {
        log::debug!("preprocessed frames to {:?}", intra.dim());
    }
    Ok((intra, extra))
}

/// Normalized intensity difference `(extra − intra) / (extra + intra)`.
///
/// Pixels where the denominator is zero yield zero instead of NaN/Inf.
///
/// # Errors
/// * `ShapeMismatch` if the frames differ in shape
pub fn normalized_difference(
    intra: &ArrayView2<f64>,
    extra: &ArrayView2<f64>,
) -> Result<Array2<f64>> {
    ensure_same_shape("extra-focal image", intra.dim(), extra.dim())?;
    let mut out = Array2::zeros(intra.dim());
    ndarray::Zip::from(&mut out)
        .and(intra)
        .and(extra)
        .for_each(|o, &i, &e| {
            let denom = e + i;
            *o = if denom != 0.0 && denom.is_finite() {
                (e - i) / denom
            } else {
                0.0
            };
        });
    Ok(out)
}
