// THEORY:
// The pixel-level layers of the engine, leaves first. Each layer only consumes the
// output of the layers above it in this list:
//
//   pixel -> raster -> row_band -> separator_detector -> segment_aggregator
//         -> content_classifier -> coverage
//
// `geometry` and `segment` are the shared data model used by every layer and by
// the refinement stage.

pub mod content_classifier;
pub mod coverage;
pub mod geometry;
pub mod pixel;
pub mod raster;
pub mod row_band;
pub mod segment;
pub mod segment_aggregator;
pub mod separator_detector;
