//! Image processing primitives for defocused pupil images.
//!
//! # Module Organization
//!
//! - **centroid**: Intensity-weighted centroid and second moments over a mask
//! - **convolve2d**: 2D convolution and Gaussian smoothing
//! - **preprocess**: Flux equalisation, cropping, noise filtering, centering,
//!   and the normalized intensity difference fed to the wavefront solver
//! - **shift**: Integer and sub-pixel translations with zero fill

pub mod centroid;
pub mod convolve2d;
pub mod preprocess;
pub mod shift;

pub use centroid::{compute_centroid_from_mask, CentroidResult};
pub use convolve2d::{convolve2d, gaussian_blur, gaussian_kernel, ConvolveMode};
pub use preprocess::{
    center_image, crop_center, filter_noise, normalize_energy, normalized_difference,
    preprocess_pair,
};
pub use shift::{shift_image, ShiftVector};
