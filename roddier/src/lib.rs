//! Curvature-sensing (Roddier) wavefront analysis
//!
//! This crate reconstructs the wavefront error of a telescope from a pair
//! of defocused pupil images, decomposes it into Zernike modes and
//! synthesizes diagnostic interferograms and point-spread functions.
//!
//! The stages, in data-flow order:
//!
//! - **registration**: align the pair, locate the pupil, build the annular mask
//! - **solver**: invert the Laplacian of the normalized intensity difference
//! - **zernike**: Noll-ordered basis on the mask, least-squares fit, reconstruction
//! - **refine**: iterate registration, solve and low-order fit to settle focus and pointing
//! - **synthesis**: interferogram and PSF of a wavefront
//! - **pipeline**: all of the above behind [`RoddierPipeline::run`]
//!
//! Every stage takes its parameters explicitly, usually from one
//! [`PipelineConfig`].
//!
//! # Example
//!
//! ```no_run
//! use ndarray::Array2;
//! use roddier::{PipelineConfig, RoddierPipeline, TelescopeParams};
//!
//! # fn main() -> roddier::Result<()> {
//! let intra: Array2<f64> = Array2::zeros((256, 256));
//! let extra: Array2<f64> = Array2::zeros((256, 256));
//! let config = PipelineConfig::new(TelescopeParams::new(200.0, 1000.0, 50.0, 3.76))?;
//! let analysis = RoddierPipeline::new(config).run(&intra.view(), &extra.view())?;
//! print!("{}", analysis.report()?.to_text());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod config_storage;
pub mod error;
pub mod fft;
pub mod image_proc;
pub mod pipeline;
pub mod refine;
pub mod registration;
pub mod report;
pub mod solver;
pub mod synthesis;
pub mod zernike;

// Re-exports for easier access
pub use config::{
    NoiseFilter, ObstructionMode, PipelineConfig, PreprocessConfig, RefinementConfig,
    RegistrationConfig, TelescopeParams,
};
pub use config_storage::TelescopeStore;
pub use error::{Result, RoddierError};
pub use image_proc::{normalized_difference, preprocess_pair, ShiftVector};
pub use pipeline::{RoddierAnalysis, RoddierPipeline};
pub use refine::{
    refine, ConvergenceStatus, IterationRecord, IterativeRefiner, RefinementResult,
    RefinementState,
};
pub use registration::{
    align, build_annular_mask, estimate_center_and_radii, estimate_defocus_mm, pupil_radius_px,
    register, Alignment, Center, PupilGeometry, RegistrationResult,
};
pub use report::{ReportTerm, ZernikeReport};
pub use solver::{spectral_laplacian, PhysicalScale, WavefrontResult, WavefrontSolver};
pub use synthesis::{
    calculate_interferogram, calculate_psf, InterferogramOptions, PsfNormalization, PsfOptions,
    PsfResult,
};
pub use zernike::{BasisSize, FitResult, ZernikeBasis};
