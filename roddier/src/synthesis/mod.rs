//! Forward models for visual checks of a reconstructed wavefront.
//!
//! Both models take the wavefront in waves and a pupil mask, and return
//! non-negative, finite arrays of the same shape. Pixels outside the pupil
//! are 0 in the interferogram.

pub mod interferogram;
pub mod psf;

pub use interferogram::{calculate_interferogram, InterferogramOptions};
pub use psf::{calculate_psf, PsfNormalization, PsfOptions, PsfResult, PSF_LOG_EPSILON};
