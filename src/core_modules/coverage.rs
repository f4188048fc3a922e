// THEORY:
// Completeness answers "how much of the image height did the decomposition account
// for?". Heights are summed in the normalized space and turned into a rounded
// percentage that can never exceed 100, even when boxes widened by rounding overlap.

use crate::core_modules::geometry::percent_of_extent;
use crate::core_modules::segment::{Segment, SegmentKind};
use crate::core_modules::segment_aggregator::AggregatedSegments;

/// Completeness of a pixel-level decomposition, 0..=100.
pub fn completeness(segments: &AggregatedSegments) -> u8 {
    let covered: f64 = segments
        .pixel_segments
        .iter()
        .chain(&segments.invalid_segments)
        .chain(&segments.separator_segments)
        .map(Segment::height)
        .sum();
    percent_of_extent(covered)
}

/// Refinement completeness: every refined-list entry counts, plus every invalid or
/// separator segment that no merged segment subsumes.
pub fn refinement_completeness(
    refined: &[Segment],
    invalid_segments: &[Segment],
    separator_segments: &[Segment],
) -> u8 {
    let merged: Vec<&Segment> = refined
        .iter()
        .filter(|s| s.kind == SegmentKind::RefinedMerge)
        .collect();

    let refined_height: f64 = refined.iter().map(Segment::height).sum();
    let loose_height: f64 = invalid_segments
        .iter()
        .chain(separator_segments)
        .filter(|s| !merged.iter().any(|m| s.bbox.is_subsumed_by(&m.bbox)))
        .map(Segment::height)
        .sum();

    percent_of_extent(refined_height + loose_height)
}
