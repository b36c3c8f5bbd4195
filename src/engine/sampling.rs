//! Reverse-mapping pixel sampling
//!
//! Shared by the MLS warp and the sculpt renderer so both use the same
//! bilinear + edge-clamp policy.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

/// Bilinear interpolation for smooth pixel sampling.
///
/// Coordinates outside the image clamp to the nearest edge pixel; there is
/// no transparency and no wraparound. Integer coordinates return the exact
/// source pixel.
pub fn bilinear_sample(image: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let (width, height) = image.dimensions();
    let max_x = (width - 1) as f64;
    let max_y = (height - 1) as f64;

    let x = if x.is_finite() { x.clamp(0.0, max_x) } else { 0.0 };
    let y = if y.is_finite() { y.clamp(0.0, max_y) } else { 0.0 };

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let dx = x - x0 as f64;
    let dy = y - y0 as f64;

    let p00 = image.get_pixel(x0, y0);
    let p10 = image.get_pixel(x1, y0);
    let p01 = image.get_pixel(x0, y1);
    let p11 = image.get_pixel(x1, y1);

    let mut result = [0u8; 4];
    for i in 0..4 {
        let v00 = p00.0[i] as f64;
        let v10 = p10.0[i] as f64;
        let v01 = p01.0[i] as f64;
        let v11 = p11.0[i] as f64;

        let value = v00 * (1.0 - dx) * (1.0 - dy)
            + v10 * dx * (1.0 - dy)
            + v01 * (1.0 - dx) * dy
            + v11 * dx * dy;

        result[i] = value.round().clamp(0.0, 255.0) as u8;
    }

    Rgba(result)
}

/// Render a new image by reverse mapping.
///
/// `source_of(x, y)` returns the source coordinate for destination pixel
/// `(x, y)`, or `None` to copy the source pixel at the same position.
/// Rows are processed in parallel.
pub fn reverse_map<F>(source: &RgbaImage, source_of: F) -> RgbaImage
where
    F: Fn(u32, u32) -> Option<(f64, f64)> + Sync,
{
    let (width, height) = source.dimensions();
    let row_len = width as usize * 4;
    let mut buffer = vec![0u8; row_len * height as usize];

    if row_len > 0 {
        buffer
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as u32;
                for x in 0..width {
                    let pixel = match source_of(x, y) {
                        Some((sx, sy)) => bilinear_sample(source, sx, sy),
                        None => *source.get_pixel(x, y),
                    };
                    let offset = x as usize * 4;
                    row[offset..offset + 4].copy_from_slice(&pixel.0);
                }
            });
    }

    // Buffer length always matches width * height * 4
    RgbaImage::from_raw(width, height, buffer).unwrap_or_else(|| RgbaImage::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bilinear_sample_center() {
        let mut img = RgbaImage::new(2, 2);
        img.put_pixel(0, 0, Rgba([100, 100, 100, 255]));
        img.put_pixel(1, 0, Rgba([200, 200, 200, 255]));
        img.put_pixel(0, 1, Rgba([100, 100, 100, 255]));
        img.put_pixel(1, 1, Rgba([200, 200, 200, 255]));

        let result = bilinear_sample(&img, 0.5, 0.5);
        assert_eq!(result.0[0], 150);
        assert_eq!(result.0[3], 255);
    }

    #[test]
    fn test_out_of_bounds_clamps_to_edge() {
        let mut img = RgbaImage::new(3, 3);
        img.put_pixel(0, 0, Rgba([10, 20, 30, 255]));
        img.put_pixel(2, 2, Rgba([40, 50, 60, 255]));

        assert_eq!(bilinear_sample(&img, -25.0, -3.5), Rgba([10, 20, 30, 255]));
        assert_eq!(bilinear_sample(&img, 99.0, 2.0), Rgba([40, 50, 60, 255]));
    }

    #[test]
    fn test_integer_coordinates_exact() {
        let img = RgbaImage::from_fn(5, 5, |x, y| Rgba([(x * 40) as u8, (y * 50) as u8, 7, 255]));
        for y in 0..5 {
            for x in 0..5 {
                assert_eq!(bilinear_sample(&img, x as f64, y as f64), *img.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn test_reverse_map_identity() {
        let img = RgbaImage::from_fn(7, 4, |x, y| Rgba([x as u8, y as u8, 3, 200]));
        let copied = reverse_map(&img, |_, _| None);
        assert_eq!(copied, img);

        let shifted = reverse_map(&img, |x, y| Some((x as f64 + 1.0, y as f64)));
        assert_eq!(shifted.get_pixel(0, 0), img.get_pixel(1, 0));
        assert_eq!(shifted.get_pixel(6, 0), img.get_pixel(6, 0));
    }
}
