// THEORY:
// The `SeparatorDetector` is the first analytical layer. It looks at one row at a
// time and asks a single question: is this row (almost) one color?
//
// Algorithm:
// 1.  **Fuzzy bucketing**: every pixel is keyed by its color with each channel
//     integer-divided by `COLOR_BUCKET_SIZE`, so anti-aliasing and compression
//     noise collapse into one bucket.
// 2.  **Majority vote**: the most populated bucket's share of the row width is the
//     row's occupancy.
// 3.  **Threshold**: a row is a separator iff occupancy >= the separator threshold,
//     derived from the caller's invalid threshold as `max(0.90, invalid - 0.05)`.
//     Equality counts as a separator.
//
// Stateless: one pass over the grid, one bool per row.

use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::raster::PixelGrid;
use std::collections::HashMap;

/// Channel width of one fuzzy color bucket.
pub const COLOR_BUCKET_SIZE: u8 = 8;

/// Floor of the derived separator threshold.
const MIN_SEPARATOR_THRESHOLD: f64 = 0.90;
/// Distance kept between the invalid threshold and the separator threshold.
const SEPARATOR_THRESHOLD_MARGIN: f64 = 0.05;

/// `max(0.90, invalid_threshold - 0.05)`.
pub fn separator_threshold(invalid_threshold: f64) -> f64 {
    MIN_SEPARATOR_THRESHOLD.max(invalid_threshold - SEPARATOR_THRESHOLD_MARGIN)
}

/// Share of the row taken by its most common fuzzy color, in `[0, 1]`.
pub fn majority_occupancy(row: &[Pixel]) -> f64 {
    if row.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<u32, usize> = HashMap::new();
    let mut majority = 0usize;
    for pixel in row {
        let count = counts.entry(pixel.bucket_key(COLOR_BUCKET_SIZE)).or_insert(0);
        *count += 1;
        majority = majority.max(*count);
    }
    majority as f64 / row.len() as f64
}

/// Classifies every row of the grid; `true` marks a separator row.
pub fn detect_separators(grid: &PixelGrid, invalid_threshold: f64) -> Vec<bool> {
    let threshold = separator_threshold(invalid_threshold);
    (0..grid.height())
        .map(|y| majority_occupancy(grid.row(y)) >= threshold)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn threshold_is_floored_at_ninety_percent() {
        assert_eq!(separator_threshold(0.5), 0.90);
        assert_eq!(separator_threshold(0.95), 0.90);
        assert!((separator_threshold(1.0) - 0.95).abs() < 1e-12);
    }

    #[test]
    fn occupancy_equal_to_threshold_is_a_separator() {
        // 18 of 20 pixels share a bucket: occupancy is exactly 0.90.
        let mut image = RgbaImage::from_pixel(20, 1, Rgba([250, 250, 250, 255]));
        image.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([0, 0, 255, 255]));
        let grid = PixelGrid::from_image(&image).unwrap();
        assert_eq!(majority_occupancy(grid.row(0)), 0.9);
        assert_eq!(detect_separators(&grid, 0.5), vec![true]);
    }

    #[test]
    fn occupancy_below_threshold_is_content() {
        // 17 of 20 pixels: 0.85.
        let mut image = RgbaImage::from_pixel(20, 1, Rgba([250, 250, 250, 255]));
        for x in 0..3 {
            image.put_pixel(x, 0, Rgba([0, 0, 0, 255]));
        }
        let grid = PixelGrid::from_image(&image).unwrap();
        assert_eq!(detect_separators(&grid, 0.5), vec![false]);
    }

    #[test]
    fn anti_aliasing_noise_stays_in_one_bucket() {
        let mut image = RgbaImage::from_pixel(10, 1, Rgba([240, 240, 240, 255]));
        image.put_pixel(3, 0, Rgba([245, 243, 247, 255]));
        let grid = PixelGrid::from_image(&image).unwrap();
        assert_eq!(majority_occupancy(grid.row(0)), 1.0);
    }
}
