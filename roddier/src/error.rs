//! Error type shared by every stage of the Roddier pipeline.

use pupil_math::{LstsqError, StatsError};
use thiserror::Error;

/// Errors raised by the Roddier pipeline.
///
/// Numerical guard conditions (zero denominators in the normalized
/// difference, near-zero spatial frequencies, rank-deficient fits) are
/// handled locally and never surface here. Everything in this enum is an
/// input or geometry problem the caller has to fix.
#[derive(Error, Debug)]
pub enum RoddierError {
    /// The annular mask selects no pixel.
    #[error("annular mask is empty (R_in = {r_in:.2}, R_out = {r_out:.2})")]
    EmptyMask { r_in: f64, r_out: f64 },

    /// The pupil could not be located or has zero area.
    #[error("degenerate pupil: {0}")]
    DegeneratePupil(String),

    /// Two arrays that must share a shape do not.
    #[error("shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// A coefficient vector does not match the basis it is used with.
    #[error("expected {expected} coefficients, got {actual}")]
    CoefficientCount { expected: usize, actual: usize },

    /// A scalar parameter is outside its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The least-squares solver rejected the system.
    #[error("least-squares fit failed: {0}")]
    LeastSquares(#[from] LstsqError),

    /// Masked statistics were requested over an unusable mask.
    #[error("statistics failed: {0}")]
    Statistics(#[from] StatsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RoddierError>;

/// Fail with [`RoddierError::ShapeMismatch`] unless both shapes agree.
pub(crate) fn ensure_same_shape(
    what: &'static str,
    expected: (usize, usize),
    actual: (usize, usize),
) -> Result<()> {
    if expected != actual {
        return Err(RoddierError::ShapeMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
