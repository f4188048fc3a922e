// THEORY:
// The `raster` module is the Raster Sampler: the bridge between a decoded image and
// the row-oriented analyzers. It owns a flat, row-major grid of `Pixel`s and hands
// out borrowed rows and row ranges, so no analyzer ever copies the image.
//
// Key architectural principles:
// 1.  **Validation at the door**: zero-sized images are rejected here with
//     `Error::Input`, so every analyzer downstream may assume `width, height > 0`.
// 2.  **Data Transformation**: raw RGBA bytes (as handed over by a decoder or a
//     frame buffer) are sliced into `Pixel`s exactly once.
// 3.  **Zero-copy access**: rows and bands are slices into the grid.

use crate::core_modules::pixel::pixel::Pixel;
use crate::error::{Error, Result};
use image::{DynamicImage, RgbaImage};

const BYTES_PER_PIXEL: usize = 4;

/// A row-major grid of RGBA pixels sampled from a source image.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    pixels: Vec<Pixel>,
}

impl PixelGrid {
    /// Builds a grid from a raw RGBA byte buffer.
    pub fn from_rgba(width: u32, height: u32, frame_buffer: &[u8]) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::Input(format!(
                "image dimensions must be positive, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if frame_buffer.len() < expected {
            return Err(Error::Input(format!(
                "RGBA buffer holds {} bytes, {width}x{height} needs {expected}",
                frame_buffer.len()
            )));
        }

        let pixels = frame_buffer[..expected]
            .chunks_exact(BYTES_PER_PIXEL)
            .map(Pixel::from)
            .collect();

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn from_image(image: &RgbaImage) -> Result<Self> {
        Self::from_rgba(image.width(), image.height(), image.as_raw())
    }

    pub fn from_dynamic(image: &DynamicImage) -> Result<Self> {
        Self::from_image(&image.to_rgba8())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// One full row of pixels. Panics on an out-of-range row like slice indexing does.
    pub fn row(&self, y: u32) -> &[Pixel] {
        let start = y as usize * self.width as usize;
        &self.pixels[start..start + self.width as usize]
    }

    /// All pixels of rows `start..end`, row-major.
    pub fn rows(&self, start: u32, end: u32) -> &[Pixel] {
        let w = self.width as usize;
        &self.pixels[start as usize * w..end as usize * w]
    }

    pub fn get(&self, x: u32, y: u32) -> Pixel {
        self.pixels[y as usize * self.width as usize + x as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimensions() {
        assert!(matches!(
            PixelGrid::from_rgba(0, 10, &[]),
            Err(Error::Input(_))
        ));
        assert!(matches!(
            PixelGrid::from_rgba(10, 0, &[]),
            Err(Error::Input(_))
        ));
    }

    #[test]
    fn rejects_short_buffers() {
        assert!(matches!(
            PixelGrid::from_rgba(2, 2, &[0u8; 15]),
            Err(Error::Input(_))
        ));
    }

    #[test]
    fn rows_are_row_major() {
        let mut image = RgbaImage::new(3, 2);
        image.put_pixel(2, 1, image::Rgba([9, 8, 7, 255]));
        let grid = PixelGrid::from_image(&image).unwrap();
        assert_eq!(grid.row(1)[2], Pixel::new(9, 8, 7, 255));
        assert_eq!(grid.get(2, 1), Pixel::new(9, 8, 7, 255));
        assert_eq!(grid.rows(0, 2).len(), 6);
    }
}
