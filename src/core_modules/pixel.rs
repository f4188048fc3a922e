// THEORY (1D Pixel Heuristics):
// The `Pixel` module is the most fundamental unit of the segmentation engine. It is a
// "dumb" data container for a single RGBA pixel plus the handful of single-pixel
// metrics the row and band analyzers need. Anything that needs another pixel
// (connectivity, variance, majority) lives in the higher-level modules.
//
// Heuristic families (all single-pixel):
// - Brightness:   luma (Rec. 601), used by the variance and flood-fill signals
// - Bucketing:    fuzzy color key (each channel integer-divided by a bucket size),
//                 used by separator detection to tolerate anti-aliasing
// - Identity:     exact packed color, used by the color-cardinality signal
// - Transparency: alpha == 0 pixels are ignored by the cardinality count

pub mod pixel {
    pub type Channel = u8;
    pub type Luma = f64;
    /// A color packed as `0xRRGGBBAA`.
    pub type PackedColor = u32;

    const CHANNELS: usize = 4;

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        /// The alpha (transparency) channel value (0-255).
        pub alpha: Channel,
    }

    impl Pixel {
        pub const fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Self {
                red,
                green,
                blue,
                alpha,
            }
        }

        /// =================================Heuristics==================================

        /// Luma estimate (Rec. 601).
        ///
        /// - Perceived brightness as a weighted sum of RGB on the 0..255 scale.
        /// - Alpha is ignored; a transparent pixel reports the luma of its color.
        pub fn luma(&self) -> Luma {
            0.299_f64 * self.red as f64 + 0.587_f64 * self.green as f64 + 0.114_f64 * self.blue as f64
        }

        /// Exact color identity, alpha included.
        pub fn packed(&self) -> PackedColor {
            u32::from_be_bytes([self.red, self.green, self.blue, self.alpha])
        }

        /// Fuzzy color identity: every channel floored into `bucket_size`-wide buckets.
        ///
        /// Two pixels that differ only by anti-aliasing noise inside one bucket share
        /// a key. A `bucket_size` of zero is treated as one (exact match).
        pub fn bucket_key(&self, bucket_size: u8) -> PackedColor {
            let bucket = bucket_size.max(1);
            u32::from_be_bytes([
                self.red / bucket,
                self.green / bucket,
                self.blue / bucket,
                self.alpha / bucket,
            ])
        }

        pub fn is_transparent(&self) -> bool {
            self.alpha == 0
        }
    }

    impl From<&[u8]> for Pixel {
        /// Reads the first four bytes as RGBA; missing bytes default to opaque black.
        fn from(bytes: &[u8]) -> Self {
            let mut rgba = [0u8, 0, 0, 255];
            for (slot, byte) in rgba.iter_mut().zip(bytes.iter().take(CHANNELS)) {
                *slot = *byte;
            }
            Pixel::new(rgba[0], rgba[1], rgba[2], rgba[3])
        }
    }

    impl From<image::Rgba<u8>> for Pixel {
        fn from(value: image::Rgba<u8>) -> Self {
            let [red, green, blue, alpha] = value.0;
            Pixel::new(red, green, blue, alpha)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn luma_matches_rec601_weights() {
            assert_eq!(Pixel::new(0, 0, 0, 255).luma(), 0.0);
            let white = Pixel::new(255, 255, 255, 255).luma();
            assert!((white - 255.0).abs() < 1e-9);
            let red = Pixel::new(100, 0, 0, 255).luma();
            assert!((red - 29.9).abs() < 1e-9);
        }

        #[test]
        fn bucket_key_absorbs_small_channel_noise() {
            let a = Pixel::new(240, 240, 240, 255);
            let b = Pixel::new(247, 241, 244, 255);
            let c = Pixel::new(248, 240, 240, 255);
            assert_eq!(a.bucket_key(8), b.bucket_key(8));
            assert_ne!(a.bucket_key(8), c.bucket_key(8));
        }

        #[test]
        fn short_byte_slices_fill_defaults() {
            let pixel = Pixel::from(&[10u8, 20][..]);
            assert_eq!(pixel, Pixel::new(10, 20, 0, 255));
        }
    }
}
