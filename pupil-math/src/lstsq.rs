//! Minimum-norm linear least squares.
//!
//! Solves `min ‖A·x − b‖₂` with the singular value decomposition of `A`.
//! Singular values below `rcond · σ_max` are treated as zero, which yields
//! the minimum-norm solution when `A` is rank deficient. This mirrors the
//! behaviour of LAPACK `gelsd` with the default cutoff
//! `rcond = max(m, n) · ε`.

use nalgebra::{DMatrix, DVector, SVD};
use thiserror::Error;

/// Errors that can occur while solving a least-squares system.
#[derive(Error, Debug)]
pub enum LstsqError {
    #[error("design matrix has {rows} rows but right-hand side has {rhs} entries")]
    DimensionMismatch { rows: usize, rhs: usize },
    #[error("design matrix is empty ({rows}x{cols})")]
    EmptySystem { rows: usize, cols: usize },
    #[error("SVD back-substitution failed: {0}")]
    SvdFailed(&'static str),
}

/// Solution of a least-squares problem together with its diagnostics.
#[derive(Debug, Clone)]
pub struct LstsqSolution {
    /// Solution vector (minimum norm when the system is rank deficient)
    pub x: DVector<f64>,
    /// Effective rank after thresholding the singular values
    pub rank: usize,
    /// Singular values of the design matrix, in decreasing order
    pub singular_values: DVector<f64>,
    /// Sum of squared residuals ‖A·x − b‖²
    pub residual_sum_squares: f64,
}

/// Solve `A·x ≈ b` in the least-squares sense with the default cutoff.
///
/// # Arguments
///
/// * `a` - Design matrix, one row per observation
/// * `b` - Observations
///
/// # Errors
///
/// * `LstsqError::DimensionMismatch` - `a.nrows() != b.len()`
/// * `LstsqError::EmptySystem` - `a` has no rows or no columns
pub fn lstsq(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<LstsqSolution, LstsqError> {
    let rcond = a.nrows().max(a.ncols()) as f64 * f64::EPSILON;
    lstsq_with_rcond(a, b, rcond)
}

/// Solve `A·x ≈ b` discarding singular values below `rcond · σ_max`.
pub fn lstsq_with_rcond(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    rcond: f64,
) -> Result<LstsqSolution, LstsqError> {
    if a.nrows() != b.len() {
        return Err(LstsqError::DimensionMismatch {
            rows: a.nrows(),
            rhs: b.len(),
        });
    }
    if a.nrows() == 0 || a.ncols() == 0 {
        return Err(LstsqError::EmptySystem {
            rows: a.nrows(),
            cols: a.ncols(),
        });
    }

    let svd = SVD::new(a.clone(), true, true);
    let sigma_max = svd.singular_values.max();

    // An all-zero design matrix has only the zero solution.
    if sigma_max <= 0.0 {
        return Ok(LstsqSolution {
            x: DVector::zeros(a.ncols()),
            rank: 0,
            singular_values: svd.singular_values.clone(),
            residual_sum_squares: b.norm_squared(),
        });
    }

    let cutoff = rcond * sigma_max;
    let rank = svd.singular_values.iter().filter(|&&s| s > cutoff).count();
    let singular_values = svd.singular_values.clone();
    let x = svd.solve(b, cutoff).map_err(LstsqError::SvdFailed)?;
    let residual_sum_squares = (a * &x - b).norm_squared();

    Ok(LstsqSolution {
        x,
        rank,
        singular_values,
        residual_sum_squares,
    })
}
