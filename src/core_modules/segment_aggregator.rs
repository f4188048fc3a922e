// THEORY:
// The `SegmentAggregator` turns the per-row verdicts of the separator detector into
// regions. It is the spatial-grouping layer of the engine, the 1D counterpart of
// region growing: consecutive rows with the same verdict form one run.
//
// Algorithm steps:
// 1.  **Run-length encoding**: the bool sequence becomes alternating runs
//     `(start_row, end_row, is_separator)` with `end_row` exclusive.
// 2.  **Normalization**: each run becomes a full-width box in the 0..1000 space.
// 3.  **Classification**: separator runs are emitted directly. Content runs become
//     `PixelContent` only when they are tall enough (`min_height_ratio * H` rows)
//     AND the content classifier finds them meaningful; everything else is
//     `InvalidNoise`. Short runs still go through the classifier so the coverage
//     accounting stays exhaustive: every row ends up in exactly one list.
//
// Labels and ids are numbered per list, 1-based, in top-to-bottom order. The
// position of a segment in `pixel_segments` is the index the refinement layer
// and the collaborator refer to.

use crate::core_modules::content_classifier;
use crate::core_modules::geometry::BoundingBox;
use crate::core_modules::raster::PixelGrid;
use crate::core_modules::row_band::row_band::RowBand;
use crate::core_modules::segment::{Segment, SegmentKind};
use crate::error::Result;

/// One maximal run of rows sharing a separator verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRun {
    pub start_row: u32,
    /// Exclusive.
    pub end_row: u32,
    pub is_separator: bool,
}

impl RowRun {
    pub fn len(&self) -> u32 {
        self.end_row - self.start_row
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The three pixel-level segment lists, each in top-to-bottom order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedSegments {
    pub pixel_segments: Vec<Segment>,
    pub invalid_segments: Vec<Segment>,
    pub separator_segments: Vec<Segment>,
}

impl AggregatedSegments {
    /// All segments of all three kinds, sorted by `ymin`.
    pub fn ordered(&self) -> Vec<&Segment> {
        let mut all: Vec<&Segment> = self
            .pixel_segments
            .iter()
            .chain(&self.invalid_segments)
            .chain(&self.separator_segments)
            .collect();
        all.sort_by(|a, b| a.bbox.ymin.total_cmp(&b.bbox.ymin));
        all
    }
}

/// Run-length encodes the per-row verdicts.
pub fn run_length_encode(rows: &[bool]) -> Vec<RowRun> {
    let mut runs = Vec::new();
    let mut start = 0usize;
    for i in 1..=rows.len() {
        if i == rows.len() || rows[i] != rows[start] {
            runs.push(RowRun {
                start_row: start as u32,
                end_row: i as u32,
                is_separator: rows[start],
            });
            start = i;
        }
    }
    runs
}

/// Builds the pixel-level segment lists for `grid` from its row verdicts.
pub fn aggregate(grid: &PixelGrid, rows: &[bool], min_height_ratio: f64) -> Result<AggregatedSegments> {
    let height = grid.height();
    let min_rows = min_height_ratio * height as f64;
    let mut segments = AggregatedSegments::default();

    for run in run_length_encode(rows) {
        let bbox = BoundingBox::from_row_span(run.start_row, run.end_row, height)?;

        if run.is_separator {
            let n = segments.separator_segments.len() + 1;
            segments.separator_segments.push(Segment::new(
                format!("separator-{n}"),
                format!("Separator {n}"),
                bbox,
                SegmentKind::Separator,
            ));
            continue;
        }

        let band = RowBand::from_grid(grid, run.start_row, run.end_row);
        let meaningful = content_classifier::is_meaningful(&band);
        if run.len() as f64 >= min_rows && meaningful {
            let n = segments.pixel_segments.len() + 1;
            segments.pixel_segments.push(Segment::new(
                format!("content-{n}"),
                format!("Block {n}"),
                bbox,
                SegmentKind::PixelContent,
            ));
        } else {
            let n = segments.invalid_segments.len() + 1;
            segments.invalid_segments.push(Segment::new(
                format!("noise-{n}"),
                format!("Noise {n}"),
                bbox,
                SegmentKind::InvalidNoise,
            ));
        }
    }

    Ok(segments)
}
