//! 2D convolution and Gaussian smoothing for pupil images
//!
//! Defocused pupil images carry shot and read noise that the normalized
//! difference amplifies near the pupil edge. A light Gaussian blur before
//! thresholding and correlation keeps the geometry estimates stable.

use ndarray::{Array2, ArrayView2};

/// Mode for handling edges in convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvolveMode {
    /// Only compute output where input and kernel fully overlap
    Valid,
    /// Use zero-padding to maintain input size
    Same,
}

/// Perform 2D convolution of an image with a kernel
///
/// # Arguments
/// * `image` - Input image as a 2D array
/// * `kernel` - Convolution kernel
/// * `mode` - Edge handling
///
/// # Returns
/// * Result of the convolution as a 2D array (empty if the kernel does not fit in `Valid` mode)
pub fn convolve2d(
    image: &ArrayView2<f64>,
    kernel: &ArrayView2<f64>,
    mode: ConvolveMode,
) -> Array2<f64> {
    let (img_rows, img_cols) = image.dim();
    let (ker_rows, ker_cols) = kernel.dim();

    if ker_rows == 0 || ker_cols == 0 {
        return Array2::zeros((0, 0));
    }

    match mode {
        ConvolveMode::Valid => {
            if ker_rows > img_rows || ker_cols > img_cols {
                return Array2::zeros((0, 0));
            }
            let out_rows = img_rows - ker_rows + 1;
            let out_cols = img_cols - ker_cols + 1;
            Array2::from_shape_fn((out_rows, out_cols), |(i, j)| {
                let mut sum = 0.0;
                for ki in 0..ker_rows {
                    for kj in 0..ker_cols {
                        sum += image[[i + ki, j + kj]] * kernel[[ker_rows - 1 - ki, ker_cols - 1 - kj]];
                    }
                }
                sum
            })
        }
        ConvolveMode::Same => {
            let pad_rows = (ker_rows / 2) as isize;
            let pad_cols = (ker_cols / 2) as isize;

            Array2::from_shape_fn((img_rows, img_cols), |(i, j)| {
                let mut sum = 0.0;
                for ki in 0..ker_rows {
                    for kj in 0..ker_cols {
                        let img_row = i as isize - (ki as isize - pad_rows);
                        let img_col = j as isize - (kj as isize - pad_cols);

                        // Zero padding outside the image
                        if img_row >= 0
                            && img_row < img_rows as isize
                            && img_col >= 0
                            && img_col < img_cols as isize
                        {
                            sum += image[[img_row as usize, img_col as usize]] * kernel[[ki, kj]];
                        }
                    }
                }
                sum
            })
        }
    }
}

/// Create a normalized Gaussian kernel of odd `size`
///
/// # Panics
/// * If `size` is even
pub fn gaussian_kernel(size: usize, sigma: f64) -> Array2<f64> {
    assert!(size % 2 == 1, "Kernel size must be odd");

    let center = (size / 2) as f64;
    let mut kernel = Array2::from_shape_fn((size, size), |(i, j)| {
        let x = j as f64 - center;
        let y = i as f64 - center;
        (-(x * x + y * y) / (2.0 * sigma * sigma)).exp()
    });

    let sum = kernel.sum();
    if sum > 0.0 {
        kernel.mapv_inplace(|v| v / sum);
    }
    kernel
}

/// Gaussian blur with a kernel truncated at ±3σ, same output size.
///
/// A non-positive or non-finite `sigma` returns the input unchanged.
pub fn gaussian_blur(image: &ArrayView2<f64>, sigma: f64) -> Array2<f64> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return image.to_owned();
    }
    let half = (3.0 * sigma).ceil().max(1.0) as usize;
    let kernel = gaussian_kernel(2 * half + 1, sigma);
    convolve2d(image, &kernel.view(), ConvolveMode::Same)
}
