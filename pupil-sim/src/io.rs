//! 8-bit PNG export of result maps.

use ndarray::{Array2, Zip};
use std::path::Path;

use crate::Result;

/// Write an 8-bit grayscale image.
pub fn save_u8_image<P: AsRef<Path>>(image: &Array2<u8>, path: P) -> Result<()> {
    use image::{ImageBuffer, Luma};

    let (height, width) = image.dim();
    let mut img_buffer = ImageBuffer::new(width as u32, height as u32);
    for (x, y, pixel) in img_buffer.enumerate_pixels_mut() {
        *pixel = Luma([image[[y as usize, x as usize]]]);
    }
    img_buffer.save(path)?;
    Ok(())
}

/// Stretch a real-valued map to `[0, 255]`.
///
/// With a mask, only masked pixels set the range and everything outside is
/// black. Constant or empty maps come out black.
pub fn map_to_u8_auto_scale(map: &Array2<f64>, mask: Option<&Array2<bool>>) -> Array2<u8> {
    let inside = |idx: (usize, usize)| mask.map_or(true, |m| m[idx]);
    let (lo, hi) = map
        .indexed_iter()
        .filter(|&(idx, v)| inside(idx) && v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, &v)| {
            (lo.min(v), hi.max(v))
        });
    let span = hi - lo;
    if !(span.is_finite() && span > 0.0) {
        return Array2::zeros(map.dim());
    }

    let mut out = Array2::zeros(map.dim());
    Zip::indexed(&mut out).and(map).for_each(|idx, o, &v| {
        if inside(idx) && v.is_finite() {
            *o = (((v - lo) / span) * 255.0).round() as u8;
        }
    });
    out
}

/// Auto-scale `map` and save it as a PNG.
pub fn save_map_png<P: AsRef<Path>>(
    map: &Array2<f64>,
    mask: Option<&Array2<bool>>,
    path: P,
) -> Result<()> {
    save_u8_image(&map_to_u8_auto_scale(map, mask), path)
}

/// Save a boolean mask as a black/white PNG.
pub fn save_mask_png<P: AsRef<Path>>(mask: &Array2<bool>, path: P) -> Result<()> {
    save_u8_image(&mask.mapv(|m| if m { 255 } else { 0 }), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_auto_scale_full_range() {
        let map = array![[-1.0, 0.0], [1.0, 3.0]];
        let scaled = map_to_u8_auto_scale(&map, None);
        assert_eq!(scaled, array![[0, 64], [128, 255]]);
    }

    #[test]
    fn test_auto_scale_respects_mask() {
        let map = array![[100.0, 1.0], [2.0, 3.0]];
        let mask = array![[false, true], [true, true]];
        let scaled = map_to_u8_auto_scale(&map, Some(&mask));
        assert_eq!(scaled[[0, 0]], 0);
        assert_eq!(scaled[[0, 1]], 0);
        assert_eq!(scaled[[1, 1]], 255);
    }

    #[test]
    fn test_constant_map_is_black() {
        let map = Array2::from_elem((3, 3), 7.0);
        assert!(map_to_u8_auto_scale(&map, None).iter().all(|&v| v == 0));
    }
}
