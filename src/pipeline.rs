// THEORY:
// The `pipeline` module is the top-level API of the pixel-level engine. It wires the
// layers of `core_modules` into one synchronous call: raster in, classified segment
// lists and a completeness figure out. It has no suspension points and no shared
// state, so callers may run it on any worker thread.

use crate::core_modules::coverage;
use crate::core_modules::raster::PixelGrid;
use crate::core_modules::segment_aggregator::{self, AggregatedSegments};
use crate::core_modules::separator_detector;
use crate::error::{Error, Result};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

// Re-export key data structures for the public API.
pub use crate::core_modules::geometry::BoundingBox;
pub use crate::core_modules::segment::{Segment, SegmentKind};

const DEFAULT_INVALID_THRESHOLD: f64 = 0.98;
const DEFAULT_MIN_HEIGHT_RATIO: f64 = 0.01;

/// The two control thresholds of a decomposition run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Drives the separator threshold (`max(0.90, invalid_threshold - 0.05)`). In `(0, 1]`.
    pub invalid_threshold: f64,
    /// Minimum content height as a share of the image height. In `(0, 1]`.
    pub min_height_ratio: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            invalid_threshold: DEFAULT_INVALID_THRESHOLD,
            min_height_ratio: DEFAULT_MIN_HEIGHT_RATIO,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("invalid_threshold", self.invalid_threshold),
            ("min_height_ratio", self.min_height_ratio),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(Error::Input(format!("{name} must be in (0, 1], got {value}")));
            }
        }
        Ok(())
    }
}

/// The pixel-level result set of one decomposition run.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionReport {
    pub segments: AggregatedSegments,
    /// Share of the image height covered by the three lists, 0..=100.
    pub completeness: u8,
    /// Per-row separator verdicts, top to bottom.
    pub separator_rows: Vec<bool>,
}

impl DecompositionReport {
    pub fn pixel_segments(&self) -> &[Segment] {
        &self.segments.pixel_segments
    }

    pub fn invalid_segments(&self) -> &[Segment] {
        &self.segments.invalid_segments
    }

    pub fn separator_segments(&self) -> &[Segment] {
        &self.segments.separator_segments
    }
}

/// The synchronous pixel-level decomposition engine.
#[derive(Debug, Clone)]
pub struct DecompositionPipeline {
    config: PipelineConfig,
}

impl DecompositionPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Decomposes `image` and caches a crop of every pixel-content segment.
    pub fn decompose(&self, image: &RgbaImage) -> Result<DecompositionReport> {
        let grid = PixelGrid::from_image(image)?;
        let mut report = self.decompose_grid(&grid)?;
        report.segments.pixel_segments = report
            .segments
            .pixel_segments
            .into_iter()
            .map(|segment| segment.with_crop(image))
            .collect();
        Ok(report)
    }

    /// Decomposes an already sampled grid. No crops are attached.
    pub fn decompose_grid(&self, grid: &PixelGrid) -> Result<DecompositionReport> {
        // Stage 1: Row classification
        let separator_rows = separator_detector::detect_separators(grid, self.config.invalid_threshold);

        // Stage 2: Run aggregation and content validity
        let segments = segment_aggregator::aggregate(grid, &separator_rows, self.config.min_height_ratio)?;
        for segment in segments.ordered() {
            segment.validate()?;
        }

        // Stage 3: Coverage
        let completeness = coverage::completeness(&segments);

        debug!(
            width = grid.width(),
            height = grid.height(),
            content = segments.pixel_segments.len(),
            noise = segments.invalid_segments.len(),
            separators = segments.separator_segments.len(),
            completeness,
            "decomposition complete"
        );

        Ok(DecompositionReport {
            segments,
            completeness,
            separator_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_thresholds_outside_unit_interval() {
        for (invalid_threshold, min_height_ratio) in [(0.0, 0.1), (1.2, 0.1), (0.9, 0.0), (0.9, f64::NAN)] {
            let config = PipelineConfig {
                invalid_threshold,
                min_height_ratio,
            };
            assert!(matches!(DecompositionPipeline::new(config), Err(Error::Input(_))));
        }
        assert!(DecompositionPipeline::new(PipelineConfig::default()).is_ok());
    }

    #[test]
    fn blank_image_is_one_separator() {
        let image = RgbaImage::from_pixel(30, 60, image::Rgba([255, 255, 255, 255]));
        let pipeline = DecompositionPipeline::new(PipelineConfig::default()).unwrap();
        let report = pipeline.decompose(&image).unwrap();
        assert!(report.pixel_segments().is_empty());
        assert_eq!(report.separator_segments().len(), 1);
        assert_eq!(report.completeness, 100);
    }
}
