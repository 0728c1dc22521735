//! Translational image shifts with zero fill.
//!
//! Registration produces integer offsets from the correlation peak, while
//! the refinement loop nulls tip/tilt with sub-pixel offsets. Both go
//! through [`shift_image`]: integer shifts copy pixels exactly, fractional
//! shifts interpolate bilinearly between the four neighbouring samples.
//! Samples that fall outside the source image read as zero.

use ndarray::{Array2, ArrayView2};

/// Pixel offset as `(dy, dx)`, i.e. `(rows, cols)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct ShiftVector {
    /// Row offset (positive moves content down)
    pub dy: f64,
    /// Column offset (positive moves content right)
    pub dx: f64,
}

impl ShiftVector {
    pub fn new(dy: f64, dx: f64) -> Self {
        Self { dy, dx }
    }

    /// Euclidean length of the shift in pixels
    pub fn magnitude(&self) -> f64 {
        self.dy.hypot(self.dx)
    }

    pub fn negated(&self) -> Self {
        Self {
            dy: -self.dy,
            dx: -self.dx,
        }
    }

    fn is_integer(&self) -> bool {
        self.dy.fract() == 0.0 && self.dx.fract() == 0.0
    }
}

fn sample_or_zero(image: &ArrayView2<f64>, row: isize, col: isize) -> f64 {
    let (rows, cols) = image.dim();
    if row < 0 || col < 0 || row >= rows as isize || col >= cols as isize {
        0.0
    } else {
        image[[row as usize, col as usize]]
    }
}

/// Shift `image` by `shift`, so that `out[y, x] = image[y − dy, x − dx]`.
///
/// Non-finite shift components are treated as zero.
pub fn shift_image(image: &ArrayView2<f64>, shift: ShiftVector) -> Array2<f64> {
    let dy = if shift.dy.is_finite() { shift.dy } else { 0.0 };
    let dx = if shift.dx.is_finite() { shift.dx } else { 0.0 };
    let shift = ShiftVector::new(dy, dx);

    if shift.is_integer() {
        let (dy, dx) = (dy as isize, dx as isize);
        return Array2::from_shape_fn(image.dim(), |(r, c)| {
            sample_or_zero(image, r as isize - dy, c as isize - dx)
        });
    }

    Array2::from_shape_fn(image.dim(), |(r, c)| {
        let src_y = r as f64 - dy;
        let src_x = c as f64 - dx;
        let y0 = src_y.floor();
        let x0 = src_x.floor();
        let fy = src_y - y0;
        let fx = src_x - x0;
        let (y0, x0) = (y0 as isize, x0 as isize);

        let v00 = sample_or_zero(image, y0, x0);
        let v01 = sample_or_zero(image, y0, x0 + 1);
        let v10 = sample_or_zero(image, y0 + 1, x0);
        let v11 = sample_or_zero(image, y0 + 1, x0 + 1);

        v00 * (1.0 - fy) * (1.0 - fx) + v01 * (1.0 - fy) * fx + v10 * fy * (1.0 - fx) + v11 * fy * fx
    })
}
