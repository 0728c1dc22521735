//! Least-squares projection onto a [`ZernikeBasis`] and reconstruction.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, ArrayView2, Zip};
use pupil_math::lstsq;
use serde::{Deserialize, Serialize};

use super::basis::ZernikeBasis;
use super::noll::mode_name;
use crate::error::{ensure_same_shape, Result, RoddierError};

/// Noll indices of piston, tilt X, tilt Y and defocus.
pub const ALIGNMENT_TERMS: [usize; 4] = [1, 2, 3, 4];

/// Coefficients of a wavefront against a basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// One coefficient per basis map, in Noll order
    pub coefficients: Vec<f64>,
    /// Analytic Noll amplitudes `coefficient / norm` (RMS over the unit disk)
    pub amplitudes: Vec<f64>,
    /// Numerical rank of the design matrix
    pub rank: usize,
    /// RMS of the fit residual over the mask
    pub residual_rms: f64,
}

impl FitResult {
    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Analytic amplitude of Noll term `j`, zero if the fit is shorter
    pub fn amplitude(&self, j: usize) -> f64 {
        j.checked_sub(1)
            .and_then(|i| self.amplitudes.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    /// `(noll index, mode name, coefficient)` for every term
    pub fn named_coefficients(&self) -> Vec<(usize, String, f64)> {
        self.coefficients
            .iter()
            .enumerate()
            .map(|(i, &c)| (i + 1, mode_name(i + 1), c))
            .collect()
    }
}

fn check_basis_shape(what: &'static str, basis: &ZernikeBasis, shape: (usize, usize)) -> Result<()> {
    ensure_same_shape(what, basis.shape(), shape)
}

/// Fit `wavefront` over the pixels where `mask` is true.
///
/// Rank-deficient systems get the minimum-norm solution.
///
/// # Errors
/// * `ShapeMismatch` if wavefront, mask and basis disagree
/// * `DegeneratePupil` if the mask selects no pixel
pub fn fit(
    wavefront: &ArrayView2<f64>,
    mask: &ArrayView2<bool>,
    basis: &ZernikeBasis,
) -> Result<FitResult> {
    ensure_same_shape("fit mask", wavefront.dim(), mask.dim())?;
    check_basis_shape("Zernike basis", basis, wavefront.dim())?;

    let pixels: Vec<(usize, usize)> = mask
        .indexed_iter()
        .filter(|&(_, &inside)| inside)
        .map(|(idx, _)| idx)
        .collect();
    if pixels.is_empty() {
        return Err(RoddierError::DegeneratePupil(
            "fit mask selects no pixel".into(),
        ));
    }

    let a = DMatrix::from_fn(pixels.len(), basis.len(), |row, col| {
        basis.terms()[col][pixels[row]]
    });
    let b = DVector::from_iterator(pixels.len(), pixels.iter().map(|&idx| wavefront[idx]));
    let solution = lstsq(&a, &b)?;

    let coefficients: Vec<f64> = solution.x.iter().copied().collect();
    let amplitudes = coefficients
        .iter()
        .zip(basis.norms())
        .map(|(&c, &norm)| if norm > 0.0 { c / norm } else { 0.0 })
        .collect();
    let residual_rms = (solution.residual_sum_squares / pixels.len() as f64).sqrt();

    log::debug!(
        "fitted {} terms over {} pixels, rank {}, residual RMS {:.3e}",
        basis.len(),
        pixels.len(),
        solution.rank,
        residual_rms
    );
    Ok(FitResult {
        coefficients,
        amplitudes,
        rank: solution.rank,
        residual_rms,
    })
}

/// Weighted sum of the basis maps, optionally re-masked.
///
/// # Errors
/// * `CoefficientCount` if `coefficients` and `basis` differ in length
/// * `ShapeMismatch` if `mask` does not match the basis
pub fn reconstruct(
    coefficients: &[f64],
    basis: &ZernikeBasis,
    mask: Option<&ArrayView2<bool>>,
) -> Result<Array2<f64>> {
    if coefficients.len() != basis.len() {
        return Err(RoddierError::CoefficientCount {
            expected: basis.len(),
            actual: coefficients.len(),
        });
    }
    let mut out = Array2::zeros(basis.shape());
    for (term, &c) in basis.terms().iter().zip(coefficients) {
        out.scaled_add(c, term);
    }
    apply_mask(out, basis, mask)
}

/// Reconstruct from the Noll indices in `selection` only.
///
/// # Errors
/// * `CoefficientCount` if `coefficients` and `basis` differ in length
/// * `InvalidParameter` if a selected index is outside `1..=basis.len()`
pub fn reconstruct_selected(
    coefficients: &[f64],
    basis: &ZernikeBasis,
    selection: &[usize],
    mask: Option<&ArrayView2<bool>>,
) -> Result<Array2<f64>> {
    if coefficients.len() != basis.len() {
        return Err(RoddierError::CoefficientCount {
            expected: basis.len(),
            actual: coefficients.len(),
        });
    }
    let mut out = Array2::zeros(basis.shape());
    for &j in selection {
        let term = basis.term(j).ok_or_else(|| {
            RoddierError::InvalidParameter(format!(
                "Noll index {j} outside 1..={}",
                basis.len()
            ))
        })?;
        out.scaled_add(coefficients[j - 1], term);
    }
    apply_mask(out, basis, mask)
}

/// `wavefront` minus its fitted piston, tilt and defocus, zero outside `mask`.
pub fn without_alignment_terms(
    wavefront: &ArrayView2<f64>,
    mask: &ArrayView2<bool>,
    fit: &FitResult,
    basis: &ZernikeBasis,
) -> Result<Array2<f64>> {
    ensure_same_shape("wavefront", basis.shape(), wavefront.dim())?;
    let present: Vec<usize> = ALIGNMENT_TERMS
        .iter()
        .copied()
        .filter(|&j| j <= basis.len())
        .collect();
    let alignment = reconstruct_selected(&fit.coefficients, basis, &present, Some(mask))?;
    let mut out = Array2::zeros(wavefront.dim());
    Zip::from(&mut out)
        .and(wavefront)
        .and(&alignment)
        .and(mask)
        .for_each(|o, &w, &a, &inside| *o = if inside { w - a } else { 0.0 });
    Ok(out)
}

/// Evaluate the fitted expansion over the full disk `r ≤ R_out`, filling
/// the central obstruction.
pub fn fill_obstruction(fit: &FitResult, basis: &ZernikeBasis) -> Result<Array2<f64>> {
    if fit.amplitudes.len() != basis.len() {
        return Err(RoddierError::CoefficientCount {
            expected: basis.len(),
            actual: fit.amplitudes.len(),
        });
    }
    let mut out = Array2::zeros(basis.shape());
    for (i, &amplitude) in fit.amplitudes.iter().enumerate() {
        if amplitude != 0.0 {
            out.scaled_add(amplitude, &basis.evaluate_on_disk(i + 1)?);
        }
    }
    Ok(out)
}

fn apply_mask(
    mut out: Array2<f64>,
    basis: &ZernikeBasis,
    mask: Option<&ArrayView2<bool>>,
) -> Result<Array2<f64>> {
    if let Some(mask) = mask {
        ensure_same_shape("reconstruction mask", basis.shape(), mask.dim())?;
        Zip::from(&mut out).and(mask).for_each(|o, &inside| {
            if !inside {
                *o = 0.0;
            }
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::Center;
    use crate::zernike::BasisSize;
    use approx::assert_abs_diff_eq;

    fn setup(terms: usize) -> (Array2<bool>, ZernikeBasis) {
        let center = Center::new(24.0, 24.0);
        let mask = Array2::from_shape_fn((49, 49), |(r, c)| {
            let d = center.distance_to(r, c);
            (5.0..=22.0).contains(&d)
        });
        let basis =
            ZernikeBasis::generate((49, 49), &mask.view(), 22.0, center, BasisSize::Terms(terms))
                .unwrap();
        (mask, basis)
    }

    #[test]
    fn test_fit_reconstruct_round_trip() {
        let (mask, basis) = setup(11);
        let coeffs = vec![0.0, 0.2, -0.1, 1.5, 0.0, 0.3, 0.0, 0.0, -0.05, 0.0, 0.4];
        let wavefront = reconstruct(&coeffs, &basis, None).unwrap();
        let result = fit(&wavefront.view(), &mask.view(), &basis).unwrap();
        for (got, want) in result.coefficients.iter().zip(&coeffs) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-8);
        }
        let back = reconstruct(&result.coefficients, &basis, Some(&mask.view())).unwrap();
        for (a, b) in back.iter().zip(wavefront.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
        assert!(result.residual_rms < 1e-10);
    }

    #[test]
    fn test_selected_and_alignment_removal() {
        let (mask, basis) = setup(6);
        let coeffs = vec![0.5, 0.1, 0.2, 0.3, 0.7, 0.0];
        let wavefront = reconstruct(&coeffs, &basis, None).unwrap();
        let result = fit(&wavefront.view(), &mask.view(), &basis).unwrap();

        let astig_only = reconstruct_selected(&coeffs, &basis, &[5], Some(&mask.view())).unwrap();
        let cleaned =
            without_alignment_terms(&wavefront.view(), &mask.view(), &result, &basis).unwrap();
        for (a, b) in cleaned.iter().zip(astig_only.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
        assert!(reconstruct_selected(&coeffs, &basis, &[7], None).is_err());
    }

    #[test]
    fn test_length_mismatch() {
        let (_, basis) = setup(4);
        assert!(matches!(
            reconstruct(&[1.0, 2.0], &basis, None),
            Err(RoddierError::CoefficientCount {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_fill_obstruction_covers_center() {
        let (mask, basis) = setup(4);
        let mut coeffs = vec![0.0; 4];
        coeffs[3] = basis.norms()[3];
        let wavefront = reconstruct(&coeffs, &basis, None).unwrap();
        let result = fit(&wavefront.view(), &mask.view(), &basis).unwrap();
        assert_abs_diff_eq!(result.amplitude(4), 1.0, epsilon = 1e-9);

        let filled = fill_obstruction(&result, &basis).unwrap();
        // sqrt(3) * (2r^2 - 1) at the centre
        assert_abs_diff_eq!(filled[[24, 24]], -(3.0f64).sqrt(), epsilon = 1e-8);
        assert_eq!(filled[[0, 0]], 0.0);
        for ((idx, &inside), &w) in mask.indexed_iter().zip(wavefront.iter()) {
            if inside {
                assert_abs_diff_eq!(filled[idx], w, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_empty_mask_is_rejected() {
        let (_, basis) = setup(3);
        let wavefront = Array2::<f64>::zeros((49, 49));
        let empty = Array2::from_elem((49, 49), false);
        assert!(matches!(
            fit(&wavefront.view(), &empty.view(), &basis),
            Err(RoddierError::DegeneratePupil(_))
        ));
    }

    #[test]
    fn test_named_coefficients() {
        let result = FitResult {
            coefficients: vec![0.1, 0.2],
            amplitudes: vec![0.0, 0.0],
            rank: 2,
            residual_rms: 0.0,
        };
        let named = result.named_coefficients();
        assert_eq!(named[1], (2, "Tilt X".to_string(), 0.2));
        assert_eq!(result.amplitude(5), 0.0);
    }
}
