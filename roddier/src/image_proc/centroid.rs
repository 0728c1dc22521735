//! Intensity-weighted centroids over a binary mask
//!
//! The pupil centre is the first moment of the thresholded intensity.
//! The second central moments come along for free and are reported so
//! callers can spot an elongated (vignetted or badly tilted) pupil.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_same_shape, Result};

/// Result from centroid calculation containing position and shape properties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidResult {
    /// Centroid x-coordinate (column)
    pub x: f64,
    /// Centroid y-coordinate (row)
    pub y: f64,
    /// Total flux (sum of all pixel intensities in mask)
    pub flux: f64,
    /// Number of pixels selected by the mask
    pub n_pixels: usize,
    /// Second central moment μ₂₀ (variance in x-direction)
    pub m_xx: f64,
    /// Second central moment μ₀₂ (variance in y-direction)
    pub m_yy: f64,
    /// Second central moment μ₁₁ (covariance between x and y)
    pub m_xy: f64,
}

impl CentroidResult {
    /// Ratio of the principal second moments (≥ 1, 1 for a round pupil).
    ///
    /// Infinite when the smaller eigenvalue vanishes.
    pub fn aspect_ratio(&self) -> f64 {
        let sum = self.m_xx + self.m_yy;
        let diff = self.m_xx - self.m_yy;
        let discriminant = (4.0 * self.m_xy.powi(2) + diff.powi(2)).sqrt();
        let lambda1 = (sum + discriminant) / 2.0;
        let lambda2 = (sum - discriminant) / 2.0;
        if lambda2 > f64::EPSILON {
            (lambda1 / lambda2).abs()
        } else {
            f64::INFINITY
        }
    }
}

/// Calculate centroid and shape moments from image data and binary mask
///
/// Pixel intensities inside the mask are the weights. Yields `None` when
/// the mask is empty or the selected flux is not positive.
///
/// # Errors
/// * `ShapeMismatch` if `image` and `mask` differ in shape
pub fn compute_centroid_from_mask(
    image: &ArrayView2<f64>,
    mask: &ArrayView2<bool>,
) -> Result<Option<CentroidResult>> {
    ensure_same_shape("centroid mask", image.dim(), mask.dim())?;

    let mut m00 = 0.0; // Total mass/intensity
    let mut m10 = 0.0; // First moment in x
    let mut m01 = 0.0; // First moment in y
    let mut m20 = 0.0;
    let mut m02 = 0.0;
    let mut m11 = 0.0;
    let mut n_pixels = 0usize;

    for ((row, col), &mask_val) in mask.indexed_iter() {
        if mask_val {
            let intensity = image[[row, col]];
            let (x, y) = (col as f64, row as f64);
            n_pixels += 1;
            m00 += intensity;
            m10 += x * intensity;
            m01 += y * intensity;
            m20 += x * x * intensity;
            m02 += y * y * intensity;
            m11 += x * y * intensity;
        }
    }

    if n_pixels == 0 || m00 < f64::EPSILON {
        return Ok(None);
    }

    let x = m10 / m00;
    let y = m01 / m00;

    Ok(Some(CentroidResult {
        x,
        y,
        flux: m00,
        n_pixels,
        m_xx: m20 / m00 - x * x,
        m_yy: m02 / m00 - y * y,
        m_xy: m11 / m00 - x * y,
    }))
}
