//! pupil-math - Numerical primitives for pupil-plane wavefront analysis
//!
//! This crate provides the small set of linear-algebra and statistics
//! routines the Roddier pipeline builds on:
//!
//! - **Least squares** - Minimum-norm linear least squares via SVD
//! - **Statistics** - Masked mean, RMS and peak-to-valley
//!
//! # Example
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use pupil_math::lstsq;
//!
//! // Fit y = a + b*x through three points
//! let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
//! let y = DVector::from_vec(vec![1.0, 3.0, 5.0]);
//! let solution = lstsq(&a, &y).unwrap();
//! assert!((solution.x[0] - 1.0).abs() < 1e-12);
//! assert!((solution.x[1] - 2.0).abs() < 1e-12);
//! ```

pub mod lstsq;
pub mod stats;

// Re-export commonly used types
pub use lstsq::{lstsq, LstsqError, LstsqSolution};
pub use stats::{masked_mean, masked_peak_to_valley, masked_rms, StatsError};
