// THEORY:
// This file is the main entry point for the `scroll_vision` library crate. It exposes
// two layers:
//
// 1.  `DecompositionPipeline` (in `pipeline`): a synchronous, deterministic pass that
//     cuts a tall screenshot into horizontal bands and classifies each one as
//     content, noise or separator.
// 2.  `SemanticOrchestrator` (in `refinement::orchestrator`): an async pass that asks
//     an analysis collaborator which bands form one logical UI unit and merges them.
//
// The `core_modules` that do the pixel work stay public for callers that want a
// single layer, but the two types above are the intended interface.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod refinement;
pub mod snapshot;

pub use error::{Error, Result, TransientKind};
pub use pipeline::{BoundingBox, DecompositionPipeline, DecompositionReport, PipelineConfig, Segment, SegmentKind};
pub use refinement::analyzer::{Analyzer, AnalyzerConfig, HttpAnalyzer, ResponseFormat};
pub use refinement::orchestrator::{
    MappingStrategy, RefinementConfig, RefinementReport, RefinementStage, SemanticOrchestrator,
};
pub use refinement::resilience::{Resilience, RetryPolicy};
pub use snapshot::{AnalysisSnapshot, AnalysisState};
