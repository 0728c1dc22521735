//! Synthetic defocused pupil images for the Roddier test
//!
//! This crate generates intra/extra-focal image pairs with known
//! aberrations, adds detector noise, and writes result maps as 8-bit PNG
//! files. It backs the `roddier_synth` command line tool and the
//! end-to-end tests of the analysis pipeline.

pub mod defocus;
pub mod io;
pub mod noise;

pub use defocus::{
    gaussian_spot_pair, synthesize_pair, wavefront_from_aberrations, Aberration, Illumination,
    PairSpec, SyntheticPair,
};
pub use io::{map_to_u8_auto_scale, save_map_png, save_mask_png, save_u8_image};
pub use noise::{add_photon_noise, add_read_noise, simple_normal_array};

use thiserror::Error;

/// Errors raised while synthesizing or exporting images.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Roddier(#[from] roddier::RoddierError),

    #[error("image export failed: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, SimError>;
