//! Zernike decomposition of pupil wavefronts.
//!
//! Terms follow the Noll ordering: piston, tilt X, tilt Y, defocus, the
//! astigmatism pair, the coma pair, the trefoil pair, primary spherical and
//! so on. Even Noll indices are cosine terms, odd ones sine terms.
//!
//! The basis is built in three steps per term: evaluate
//! `N_j · R_n^|m|(ρ) · {cos mθ, sin |m|θ}` with the analytic Noll constant
//! `N_j`, zero it outside the pupil mask, then divide by its L2 norm over
//! the mask. Fitting against this basis gives coefficients in wavefront
//! units times `sqrt(pixels)`; [`FitResult::amplitudes`] divides the norms
//! back out, giving the usual Noll amplitudes (RMS over the unit disk) that
//! are independent of the sampling.
//!
//! # Module Organization
//!
//! - **noll**: Index mapping, radial polynomials, normalization, mode names
//! - **basis**: [`ZernikeBasis`] generation on a pixel grid
//! - **fit**: Least-squares fit, reconstruction, mode selection

pub mod basis;
pub mod fit;
pub mod noll;

pub use basis::{polar_grid, BasisSize, ZernikeBasis};
pub use fit::{
    fill_obstruction, fit, reconstruct, reconstruct_selected, without_alignment_terms, FitResult,
    ALIGNMENT_TERMS,
};
pub use noll::{mode_name, noll_normalization, noll_to_nm, radial_polynomial, terms_for_order};
