// THEORY:
// The `RowBand` module represents a horizontal band of pixel rows: one run of
// consecutive rows that the separator detector put on the same side. It is the unit
// the content classifier judges.
//
// Key architectural principles:
// 1.  **Borrowed View**: A band borrows its pixels straight out of the `PixelGrid`;
//     building one is free.
// 2.  **Data Container**: Like `Pixel`, `RowBand` is a "dumb" data container. It
//     knows its size and can summarize its own data (luma plane, downsampled copy),
//     but it does not decide whether it is meaningful.
// 3.  **Bounded Work**: `downsampled` caps the longer side, so the flood fill in the
//     classifier costs the same on a 3000-row banner as on a 300-row one.

pub mod row_band {
    use crate::core_modules::pixel::pixel::Pixel;
    use crate::core_modules::raster::PixelGrid;

    /// A borrowed, row-major block of full-width pixel rows.
    #[derive(Debug, Clone, Copy)]
    pub struct RowBand<'a> {
        /// The width of the band in pixels.
        pub width: u32,
        /// The height of the band in pixels.
        pub height: u32,
        /// First source row (inclusive).
        pub start_row: u32,
        /// Row-major pixels of the band.
        pub pixels: &'a [Pixel],
    }

    impl<'a> RowBand<'a> {
        /// Borrows rows `start..end` of the grid.
        pub fn from_grid(grid: &'a PixelGrid, start: u32, end: u32) -> Self {
            Self {
                width: grid.width(),
                height: end - start,
                start_row: start,
                pixels: grid.rows(start, end),
            }
        }

        pub fn area(&self) -> usize {
            self.width as usize * self.height as usize
        }

        /// Luma of every pixel, row-major.
        pub fn luma_plane(&self) -> Vec<f64> {
            self.pixels.iter().map(Pixel::luma).collect()
        }

        /// Nearest-neighbour downsample so that the longer side is at most `max_side`.
        ///
        /// Returns `(width, height, luma)` of the sampled plane. Bands already small
        /// enough are returned at full resolution.
        pub fn downsampled_luma(&self, max_side: u32) -> (u32, u32, Vec<f64>) {
            let longer = self.width.max(self.height);
            if longer <= max_side || max_side == 0 {
                return (self.width, self.height, self.luma_plane());
            }

            let scale = max_side as f64 / longer as f64;
            let sample_w = ((self.width as f64 * scale).round() as u32).max(1);
            let sample_h = ((self.height as f64 * scale).round() as u32).max(1);

            let mut plane = Vec::with_capacity(sample_w as usize * sample_h as usize);
            for sy in 0..sample_h {
                let y = (sy as u64 * self.height as u64 / sample_h as u64) as usize;
                for sx in 0..sample_w {
                    let x = (sx as u64 * self.width as u64 / sample_w as u64) as usize;
                    plane.push(self.pixels[y * self.width as usize + x].luma());
                }
            }
            (sample_w, sample_h, plane)
        }
    }

}
