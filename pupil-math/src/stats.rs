//! Statistics over masked 2D maps.
//!
//! Wavefront maps are only meaningful inside the pupil, so every summary
//! here takes a boolean mask of the same shape and ignores the rest.

use ndarray::ArrayView2;
use thiserror::Error;

/// Errors from statistical computations.
#[derive(Error, Debug, PartialEq)]
pub enum StatsError {
    #[error("data shape {data:?} does not match mask shape {mask:?}")]
    ShapeMismatch {
        data: (usize, usize),
        mask: (usize, usize),
    },
    #[error("no samples selected by the mask")]
    Empty,
}

fn selected<'a>(
    data: &'a ArrayView2<f64>,
    mask: &'a ArrayView2<bool>,
) -> Result<impl Iterator<Item = f64> + 'a, StatsError> {
    if data.dim() != mask.dim() {
        return Err(StatsError::ShapeMismatch {
            data: data.dim(),
            mask: mask.dim(),
        });
    }
    if !mask.iter().any(|&m| m) {
        return Err(StatsError::Empty);
    }
    Ok(data
        .iter()
        .zip(mask.iter())
        .filter(|&(_, &m)| m)
        .map(|(&v, _)| v))
}

/// Mean of the values selected by `mask`.
pub fn masked_mean(data: &ArrayView2<f64>, mask: &ArrayView2<bool>) -> Result<f64, StatsError> {
    let (sum, count) = selected(data, mask)?.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    Ok(sum / count as f64)
}

/// Root-mean-square deviation from the masked mean.
///
/// Piston does not contribute, which is the usual convention when quoting
/// wavefront error.
pub fn masked_rms(data: &ArrayView2<f64>, mask: &ArrayView2<bool>) -> Result<f64, StatsError> {
    let mean = masked_mean(data, mask)?;
    let (sum_sq, count) = selected(data, mask)?.fold((0.0, 0usize), |(s, n), v| {
        (s + (v - mean).powi(2), n + 1)
    });
    Ok((sum_sq / count as f64).sqrt())
}

/// Peak-to-valley (max − min) of the masked values.
pub fn masked_peak_to_valley(
    data: &ArrayView2<f64>,
    mask: &ArrayView2<bool>,
) -> Result<f64, StatsError> {
    let (lo, hi) = selected(data, mask)?.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    Ok(hi - lo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    #[test]
    fn test_masked_mean_ignores_outside() {
        let data = array![[1.0, 100.0], [3.0, 100.0]];
        let mask = array![[true, false], [true, false]];
        assert_relative_eq!(masked_mean(&data.view(), &mask.view()).unwrap(), 2.0);
    }

    #[test]
    fn test_masked_rms_removes_piston() {
        let data = array![[5.0, 7.0], [5.0, 7.0]];
        let mask = Array2::from_elem((2, 2), true);
        assert_relative_eq!(masked_rms(&data.view(), &mask.view()).unwrap(), 1.0);
    }

    #[test]
    fn test_peak_to_valley() {
        let data = array![[-2.0, 0.5], [4.0, 99.0]];
        let mask = array![[true, true], [true, false]];
        assert_relative_eq!(
            masked_peak_to_valley(&data.view(), &mask.view()).unwrap(),
            6.0
        );
    }

    #[test]
    fn test_empty_mask_is_error() {
        let data = Array2::<f64>::zeros((3, 3));
        let mask = Array2::from_elem((3, 3), false);
        assert_eq!(
            masked_mean(&data.view(), &mask.view()),
            Err(StatsError::Empty)
        );
    }

    #[test]
    fn test_shape_mismatch() {
        let data = Array2::<f64>::zeros((3, 3));
        let mask = Array2::from_elem((3, 2), true);
        assert!(matches!(
            masked_rms(&data.view(), &mask.view()),
            Err(StatsError::ShapeMismatch { .. })
        ));
    }
}
