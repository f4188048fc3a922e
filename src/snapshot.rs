// THEORY:
// A snapshot freezes one analysis so it can be stored and restored later without
// re-running the pipeline or the collaborator. Only boxes and labels are persisted,
// plus the source image itself; crops are derived data and are cut again from the
// source image on restore, so a restored segment is indistinguishable from a fresh
// one.

use crate::core_modules::segment::Segment;
use crate::error::{Error, Result};
use crate::pipeline::{DecompositionReport, PipelineConfig};
use crate::refinement::orchestrator::RefinementReport;
use crate::refinement::transport::prepare_image;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything needed to describe one finished analysis.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisState<'a> {
    pub source: &'a RgbaImage,
    pub config: PipelineConfig,
    pub decomposition: &'a DecompositionReport,
    pub refinement: Option<&'a RefinementReport>,
}

/// The persisted form of an [`AnalysisState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSnapshot {
    pub version: u32,
    /// Base64 PNG of the full-resolution source image.
    pub source_image: String,
    pub invalid_threshold: f64,
    pub min_height_ratio: f64,
    pub completeness: u8,
    pub pixel_segments: Vec<Segment>,
    pub invalid_segments: Vec<Segment>,
    pub separator_segments: Vec<Segment>,
    #[serde(default)]
    pub refined_segments: Vec<Segment>,
}

/// Segment lists rebuilt from a snapshot, crops attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoredSegments {
    pub pixel_segments: Vec<Segment>,
    pub invalid_segments: Vec<Segment>,
    pub separator_segments: Vec<Segment>,
    pub refined_segments: Vec<Segment>,
}

fn without_crops(segments: &[Segment]) -> Vec<Segment> {
    segments
        .iter()
        .cloned()
        .map(|mut segment| {
            segment.strip_crop();
            segment
        })
        .collect()
}

pub fn serialize_for_snapshot(state: &AnalysisState<'_>) -> Result<AnalysisSnapshot> {
    let source = prepare_image(state.source, None)?;
    Ok(AnalysisSnapshot {
        version: SNAPSHOT_VERSION,
        source_image: source.data,
        invalid_threshold: state.config.invalid_threshold,
        min_height_ratio: state.config.min_height_ratio,
        completeness: state.decomposition.completeness,
        pixel_segments: without_crops(state.decomposition.pixel_segments()),
        invalid_segments: without_crops(state.decomposition.invalid_segments()),
        separator_segments: without_crops(state.decomposition.separator_segments()),
        refined_segments: state
            .refinement
            .map(|report| without_crops(&report.refined_segments))
            .unwrap_or_default(),
    })
}

impl AnalysisSnapshot {
    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            invalid_threshold: self.invalid_threshold,
            min_height_ratio: self.min_height_ratio,
        }
    }

    /// Decodes the embedded source image.
    pub fn source_image(&self) -> Result<RgbaImage> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD.decode(&self.source_image)?;
        Ok(image::load_from_memory(&bytes)?.to_rgba8())
    }
}

/// Restores every segment list of `record`, cutting crops from `source`.
pub fn segments_from_snapshot(record: &AnalysisSnapshot, source: &RgbaImage) -> Result<RestoredSegments> {
    if record.version != SNAPSHOT_VERSION {
        return Err(Error::Input(format!(
            "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
            record.version
        )));
    }
    record.config().validate()?;

    let restore = |segments: &[Segment]| -> Result<Vec<Segment>> {
        segments
            .iter()
            .map(|segment| {
                segment.validate()?;
                Ok(segment.clone().with_crop(source))
            })
            .collect()
    };

    Ok(RestoredSegments {
        pixel_segments: restore(&record.pixel_segments)?,
        invalid_segments: restore(&record.invalid_segments)?,
        separator_segments: restore(&record.separator_segments)?,
        refined_segments: restore(&record.refined_segments)?,
    })
}
