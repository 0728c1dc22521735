//! Seeded detector noise for synthetic pupil images.
//!
//! Every generator takes an explicit seed so a synthetic pair, and any
//! test that uses it, is reproducible.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Poisson};

use crate::{Result, SimError};

/// Array of samples from `Normal(mean, std_dev)`.
///
/// # Panics
/// * If `std_dev` is negative or not finite
pub fn simple_normal_array(
    size: (usize, usize),
    mean: f64,
    std_dev: f64,
    seed: u64,
) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal_dist = Normal::new(mean, std_dev)
        .expect("Normal distribution parameters must be valid (std_dev >= 0)");
    Array2::from_shape_fn(size, |_| normal_dist.sample(&mut rng))
}

/// Add zero-mean Gaussian read noise of `std_dev` to `image`.
///
/// # Errors
/// * `InvalidParameter` if `std_dev` is negative or not finite
pub fn add_read_noise(image: &Array2<f64>, std_dev: f64, seed: u64) -> Result<Array2<f64>> {
    if !(std_dev.is_finite() && std_dev >= 0.0) {
        return Err(SimError::InvalidParameter(format!(
            "read noise must be non-negative, got {std_dev}"
        )));
    }
    Ok(image + &simple_normal_array(image.dim(), 0.0, std_dev, seed))
}

/// Replace every pixel by a Poisson draw with the pixel value as mean.
///
/// Pixels with a non-positive mean stay at zero.
pub fn add_photon_noise(image: &Array2<f64>, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    image.mapv(|mean| {
        if mean > 0.0 && mean.is_finite() {
            match Poisson::new(mean) {
                Ok(dist) => dist.sample(&mut rng),
                Err(_) => mean,
            }
        } else {
            0.0
        }
    })
}
