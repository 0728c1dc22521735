//! Two-dimensional discrete Fourier transforms on `ndarray` grids.
//!
//! `rustfft` only plans one-dimensional transforms, so the 2D transform is
//! done row by row and then column by column. The conventions follow the
//! usual numerical ones:
//!
//! - forward transform is unnormalized, inverse is scaled by `1/(rows·cols)`
//! - [`fftfreq`] returns frequencies in cycles per sample, zero first
//! - [`fftshift`] moves the zero-frequency bin to index `n/2`,
//!   [`ifftshift`] undoes it (they differ for odd lengths)

use ndarray::{Array2, ArrayView2, Axis};
use rustfft::{num_complex::Complex64, FftDirection, FftPlanner};

fn transform_axes(data: &mut Array2<Complex64>, direction: FftDirection) {
    let (rows, cols) = data.dim();
    if rows == 0 || cols == 0 {
        return;
    }
    let mut planner = FftPlanner::<f64>::new();

    let row_fft = planner.plan_fft(cols, direction);
    let mut buffer = vec![Complex64::new(0.0, 0.0); cols];
    for mut row in data.axis_iter_mut(Axis(0)) {
        for (dst, src) in buffer.iter_mut().zip(row.iter()) {
            *dst = *src;
        }
        row_fft.process(&mut buffer);
        for (dst, src) in row.iter_mut().zip(buffer.iter()) {
            *dst = *src;
        }
    }

    let col_fft = planner.plan_fft(rows, direction);
    let mut buffer = vec![Complex64::new(0.0, 0.0); rows];
    for mut col in data.axis_iter_mut(Axis(1)) {
        for (dst, src) in buffer.iter_mut().zip(col.iter()) {
            *dst = *src;
        }
        col_fft.process(&mut buffer);
        for (dst, src) in col.iter_mut().zip(buffer.iter()) {
            *dst = *src;
        }
    }
}

/// Forward 2D FFT of a complex grid.
pub fn fft2(input: &ArrayView2<Complex64>) -> Array2<Complex64> {
    let mut data = input.to_owned();
    transform_axes(&mut data, FftDirection::Forward);
    data
}

/// Forward 2D FFT of a real grid.
pub fn fft2_real(input: &ArrayView2<f64>) -> Array2<Complex64> {
    let mut data = input.mapv(|v| Complex64::new(v, 0.0));
    transform_axes(&mut data, FftDirection::Forward);
    data
}

/// Inverse 2D FFT, normalized so that `ifft2(fft2(x)) == x`.
pub fn ifft2(input: &ArrayView2<Complex64>) -> Array2<Complex64> {
    let mut data = input.to_owned();
    transform_axes(&mut data, FftDirection::Inverse);
    let n = data.len();
    if n > 0 {
        let scale = 1.0 / n as f64;
        data.mapv_inplace(|v| v * scale);
    }
    data
}

/// Sample frequencies (cycles per sample) for an FFT of length `n`.
///
/// `[0, 1, …, ⌈n/2⌉−1, −⌊n/2⌋, …, −1] / n`
pub fn fftfreq(n: usize) -> Vec<f64> {
    let positive = (n.saturating_sub(1)) / 2 + 1;
    (0..n)
        .map(|k| {
            let signed = if k < positive {
                k as f64
            } else {
                k as f64 - n as f64
            };
            signed / n as f64
        })
        .collect()
}

/// Squared spatial-frequency magnitude `fx² + fy²` for a `(rows, cols)` grid.
pub fn frequency_squared_grid(shape: (usize, usize)) -> Array2<f64> {
    let fy = fftfreq(shape.0);
    let fx = fftfreq(shape.1);
    Array2::from_shape_fn(shape, |(r, c)| fx[c] * fx[c] + fy[r] * fy[r])
}

fn roll<T: Clone>(input: &ArrayView2<T>, shift_rows: usize, shift_cols: usize) -> Array2<T> {
    let (rows, cols) = input.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        input[[(r + rows - shift_rows) % rows, (c + cols - shift_cols) % cols]].clone()
    })
}

/// Move the zero-frequency component to the centre of the grid.
pub fn fftshift<T: Clone>(input: &ArrayView2<T>) -> Array2<T> {
    let (rows, cols) = input.dim();
    if rows == 0 || cols == 0 {
        return input.to_owned();
    }
    roll(input, rows / 2, cols / 2)
}

/// Inverse of [`fftshift`].
pub fn ifftshift<T: Clone>(input: &ArrayView2<T>) -> Array2<T> {
    let (rows, cols) = input.dim();
    if rows == 0 || cols == 0 {
        return input.to_owned();
    }
    roll(input, rows - rows / 2, cols - cols / 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_fftfreq_even_and_odd() {
        assert_eq!(fftfreq(4), vec![0.0, 0.25, -0.5, -0.25]);
        assert_eq!(fftfreq(5), vec![0.0, 0.2, 0.4, -0.4, -0.2]);
        assert!(fftfreq(0).is_empty());
    }

    #[test]
    fn test_forward_inverse_round_trip() {
        let input = Array2::from_shape_fn((6, 5), |(r, c)| (r * 7 + c * 3) as f64 % 4.0 - 1.5);
        let spectrum = fft2_real(&input.view());
        let back = ifft2(&spectrum.view());
        for (a, b) in input.iter().zip(back.iter()) {
            assert_abs_diff_eq!(*a, b.re, epsilon = 1e-12);
            assert_abs_diff_eq!(b.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_dc_bin_is_sum() {
        let input = Array2::from_elem((4, 8), 0.5);
        let spectrum = fft2_real(&input.view());
        assert_abs_diff_eq!(spectrum[[0, 0]].re, 16.0, epsilon = 1e-12);
        assert_abs_diff_eq!(spectrum[[1, 3]].norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fftshift_places_origin_at_center() {
        let input = array![[1, 2, 3], [4, 5, 6], [7, 8, 9]];
        let shifted = fftshift(&input.view());
        assert_eq!(shifted[[1, 1]], 1);
        assert_eq!(ifftshift(&shifted.view()), input);

        let even = Array2::from_shape_fn((4, 4), |(r, c)| r * 4 + c);
        let shifted = fftshift(&even.view());
        assert_eq!(shifted[[2, 2]], 0);
        assert_eq!(ifftshift(&shifted.view()), even);
    }

    #[test]
    fn test_frequency_squared_grid() {
        let grid = frequency_squared_grid((4, 4));
        assert_eq!(grid[[0, 0]], 0.0);
        assert_abs_diff_eq!(grid[[0, 1]], 0.0625, epsilon = 1e-15);
        assert_abs_diff_eq!(grid[[2, 2]], 0.5, epsilon = 1e-15);
    }
}
