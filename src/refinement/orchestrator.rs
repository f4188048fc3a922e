// THEORY:
// The orchestrator lifts the pixel decomposition into semantic units with the help of
// the analysis collaborator. It is a small state machine:
//
//   StructuralAnalysisPending -> MappingPending -> LocalMergeComplete
//              \___________________\________________-> Error
//
// 1.  **Structural analysis**: the whole screenshot goes out with a fixed instruction
//     set; back comes an ordered list of `StructuralUnit`s (labels, no geometry).
// 2.  **Mapping**: the units are tied to pixel-content segments by one of two
//     strategies. `AnnotatedPreview` sends a numbered overlay and gets
//     `MappingRecord`s back in one call. `PairwiseRelevance` asks a yes/no question
//     per adjacent pair through `ParallelPipeline` and turns the merged groups into
//     records itself.
// 3.  **Local merge**: pure geometry. Each accepted record becomes one full-width
//     `RefinedMerge` segment; pixel segments nobody claimed pass through unmapped.
//
// The image is never re-analysed at pixel level here: every box in the refined list
// is built from boxes the decomposition already produced.

use crate::core_modules::coverage;
use crate::core_modules::geometry::full_width_union;
use crate::core_modules::segment::{Segment, SegmentKind, crop_region};
use crate::error::{Error, Result};
use crate::parallel_pipeline::{MergeUnit, ParallelPipeline, RelevanceOracle};
use crate::pipeline::DecompositionReport;
use crate::refinement::analyzer::{Analyzer, ResponseFormat};
use crate::refinement::annotate::render_preview;
use crate::refinement::prompts;
use crate::refinement::resilience::{Resilience, RetryPolicy};
use crate::refinement::response::{self, MappingRecord, StructuralUnit};
use crate::refinement::transport::{ImagePayload, MAX_TRANSPORT_WIDTH, prepare_image};
use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How structural units are tied to pixel segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MappingStrategy {
    /// One call with a numbered overlay of every pixel segment.
    #[default]
    AnnotatedPreview,
    /// One yes/no call per adjacent pair, batched.
    PairwiseRelevance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefinementConfig {
    pub strategy: MappingStrategy,
    pub response_format: ResponseFormat,
    /// Segments per group in pairwise mode.
    pub batch_size: usize,
    /// Groups in flight at once in pairwise mode.
    pub concurrency_limit: usize,
    pub retry: RetryPolicy,
    pub max_image_width: u32,
    /// When false the annotated preview is sent at full resolution.
    pub downscale_preview: bool,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            strategy: MappingStrategy::default(),
            response_format: ResponseFormat::default(),
            batch_size: 6,
            concurrency_limit: num_cpus::get().clamp(1, 4),
            retry: RetryPolicy::default(),
            max_image_width: MAX_TRANSPORT_WIDTH,
            downscale_preview: true,
        }
    }
}

impl RefinementConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.concurrency_limit == 0 || self.max_image_width == 0 {
            return Err(Error::Input(
                "batch_size, concurrency_limit and max_image_width must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Input("retry.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefinementStage {
    StructuralAnalysisPending,
    MappingPending,
    LocalMergeComplete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementReport {
    pub structural_units: Vec<StructuralUnit>,
    /// Records that survived validation, indices filtered.
    pub mappings: Vec<MappingRecord>,
    /// Merged and unmapped segments, ascending by `ymin`.
    pub refined_segments: Vec<Segment>,
    pub completeness: u8,
    pub stage: RefinementStage,
}

/// Drives structural analysis, mapping and local merge for one screenshot at a time.
pub struct SemanticOrchestrator {
    analyzer: Arc<dyn Analyzer>,
    config: RefinementConfig,
    resilience: Resilience,
    stage: RefinementStage,
}

impl SemanticOrchestrator {
    pub fn new(analyzer: Arc<dyn Analyzer>, config: RefinementConfig) -> Result<Self> {
        config.validate()?;
        let resilience = Resilience::new(config.retry);
        Ok(Self {
            analyzer,
            config,
            resilience,
            stage: RefinementStage::StructuralAnalysisPending,
        })
    }

    /// Replaces the retry driver, e.g. with a deterministic jitter source.
    pub fn with_resilience(mut self, resilience: Resilience) -> Self {
        self.resilience = resilience;
        self
    }

    pub fn stage(&self) -> RefinementStage {
        self.stage
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    fn transition(&mut self, next: RefinementStage) {
        info!(from = ?self.stage, to = ?next, "refinement stage");
        self.stage = next;
    }

    /// Refines `report`, which must come from decomposing `image`. Any failure moves
    /// the orchestrator to [`RefinementStage::Error`] and leaves `report` untouched.
    pub async fn refine(&mut self, image: &RgbaImage, report: &DecompositionReport) -> Result<RefinementReport> {
        self.stage = RefinementStage::StructuralAnalysisPending;
        match self.run(image, report).await {
            Ok(refined) => Ok(refined),
            Err(err) => {
                warn!(error = %err, "refinement failed");
                self.transition(RefinementStage::Error);
                Err(err)
            }
        }
    }

    async fn run(&mut self, image: &RgbaImage, report: &DecompositionReport) -> Result<RefinementReport> {
        let pixel_segments = report.pixel_segments();
        if pixel_segments.is_empty() {
            debug!("no pixel content to refine");
            self.transition(RefinementStage::LocalMergeComplete);
            return Ok(RefinementReport {
                structural_units: Vec::new(),
                mappings: Vec::new(),
                refined_segments: Vec::new(),
                completeness: coverage::refinement_completeness(
                    &[],
                    report.invalid_segments(),
                    report.separator_segments(),
                ),
                stage: self.stage,
            });
        }

        // Step A: Structural analysis
        let units = self.structural_analysis(image).await?;
        info!(units = units.len(), "structural analysis complete");
        self.transition(RefinementStage::MappingPending);

        // Step B: Mapping
        let (labels, records) = match self.config.strategy {
            MappingStrategy::AnnotatedPreview => {
                let records = self.annotated_mapping(image, pixel_segments, &units).await?;
                (units.clone(), records)
            }
            MappingStrategy::PairwiseRelevance => self.pairwise_mapping(image, pixel_segments, &units).await?,
        };

        // Step C: Local merge
        let (refined, accepted) = local_merge(pixel_segments, &labels, &records)?;
        let refined_segments: Vec<Segment> = refined.into_iter().map(|s| s.with_crop(image)).collect();
        let completeness = coverage::refinement_completeness(
            &refined_segments,
            report.invalid_segments(),
            report.separator_segments(),
        );
        self.transition(RefinementStage::LocalMergeComplete);

        Ok(RefinementReport {
            structural_units: units,
            mappings: accepted,
            refined_segments,
            completeness,
            stage: self.stage,
        })
    }

    async fn structural_analysis(&self, image: &RgbaImage) -> Result<Vec<StructuralUnit>> {
        let payload = prepare_image(image, Some(self.config.max_image_width))?;
        let raw = ask(
            self.analyzer.as_ref(),
            &self.resilience,
            "structural",
            &[payload],
            prompts::STRUCTURAL_INSTRUCTION,
            self.config.response_format,
        )
        .await?;
        response::parse_structural(&raw)
    }

    async fn annotated_mapping(
        &self,
        image: &RgbaImage,
        pixel_segments: &[Segment],
        units: &[StructuralUnit],
    ) -> Result<Vec<MappingRecord>> {
        let preview = render_preview(image, pixel_segments)?;
        let width = self.config.downscale_preview.then_some(self.config.max_image_width);
        let payload = prepare_image(&preview, width)?;
        let instruction = prompts::mapping_instruction(units, pixel_segments.len());
        let raw = ask(
            self.analyzer.as_ref(),
            &self.resilience,
            "mapping",
            &[payload],
            &instruction,
            self.config.response_format,
        )
        .await?;
        response::parse_mapping(&raw)
    }

    /// Merged groups become records, each under its own sequence. The i-th group takes
    /// the i-th unit's sequence and description unless an earlier group already holds
    /// that sequence; then it gets a fresh one. Returns the labels alongside the records.
    async fn pairwise_mapping(
        &self,
        image: &RgbaImage,
        pixel_segments: &[Segment],
        units: &[StructuralUnit],
    ) -> Result<(Vec<StructuralUnit>, Vec<MappingRecord>)> {
        let oracle = CollaboratorOracle {
            analyzer: self.analyzer.as_ref(),
            resilience: &self.resilience,
            source: image,
            context: units,
            format: self.config.response_format,
            max_width: self.config.max_image_width,
        };
        let merge_units: Vec<MergeUnit> = pixel_segments
            .iter()
            .enumerate()
            .map(|(i, segment)| MergeUnit::single(i + 1, segment.bbox))
            .collect();

        let pipeline = ParallelPipeline::new(&oracle, self.config.batch_size, self.config.concurrency_limit);
        let merged = pipeline.run(merge_units).await?;

        Ok(assign_sequences(units, merged.iter().filter(|group| group.is_merged())))
    }
}

async fn ask(
    analyzer: &dyn Analyzer,
    resilience: &Resilience,
    label: &str,
    images: &[ImagePayload],
    instruction: &str,
    format: ResponseFormat,
) -> Result<String> {
    resilience
        .call(label, || analyzer.analyze(images, instruction, format))
        .await
}

/// Answers relevance questions with crops of the two regions.
struct CollaboratorOracle<'a> {
    analyzer: &'a dyn Analyzer,
    resilience: &'a Resilience,
    source: &'a RgbaImage,
    context: &'a [StructuralUnit],
    format: ResponseFormat,
    max_width: u32,
}

#[async_trait]
impl RelevanceOracle for CollaboratorOracle<'_> {
    async fn related(&self, upper: &MergeUnit, lower: &MergeUnit) -> Result<bool> {
        let images = [
            prepare_image(&crop_region(self.source, &upper.bbox), Some(self.max_width))?,
            prepare_image(&crop_region(self.source, &lower.bbox), Some(self.max_width))?,
        ];
        let instruction = prompts::relevance_instruction(&upper.parents, &lower.parents, self.context);
        let raw = ask(
            self.analyzer,
            self.resilience,
            "relevance",
            &images,
            &instruction,
            self.format,
        )
        .await?;
        let related = response::parse_relevance(&raw)?;
        debug!(upper = ?upper.parents, lower = ?lower.parents, related, "relevance verdict");
        Ok(related)
    }
}

/// Pairs merged groups with structural units in order, giving every group a distinct
/// sequence.
fn assign_sequences<'g>(
    units: &[StructuralUnit],
    groups: impl Iterator<Item = &'g MergeUnit>,
) -> (Vec<StructuralUnit>, Vec<MappingRecord>) {
    let mut spare_sequence = units.iter().map(|u| u.sequence).max().unwrap_or(0);
    let mut used = HashSet::new();
    let mut labels = Vec::new();
    let mut records = Vec::new();

    for (i, group) in groups.enumerate() {
        let unit = units.get(i);
        let sequence = match unit {
            Some(unit) if used.insert(unit.sequence) => unit.sequence,
            _ => loop {
                spare_sequence += 1;
                if used.insert(spare_sequence) {
                    break spare_sequence;
                }
            },
        };
        let description = match unit {
            Some(unit) => unit.description.clone(),
            None => format!("Unit {sequence}"),
        };
        labels.push(StructuralUnit { sequence, description });
        records.push(MappingRecord {
            sequence,
            mapped_indices: group.parents.iter().map(|&p| p as i64).collect(),
        });
    }
    (labels, records)
}

/// Turns mapping records into full-width merged segments.
///
/// Records are applied in `sequence` order. Indices outside `1..=len` are dropped
/// with a warning, an index already claimed by an earlier record stays with that
/// record, and a record left with no indices is dropped. Pixel segments no record
/// claims are carried through tagged unmapped. The result is sorted by `ymin`.
///
/// Fails with [`Error::ServiceResponse`] when the records name indices but not one
/// of them is in range.
pub fn local_merge(
    pixel_segments: &[Segment],
    units: &[StructuralUnit],
    records: &[MappingRecord],
) -> Result<(Vec<Segment>, Vec<MappingRecord>)> {
    let count = pixel_segments.len();
    let mut ordered: Vec<&MappingRecord> = records.iter().collect();
    ordered.sort_by_key(|record| record.sequence);

    let mut claimed = vec![false; count];
    let mut seen_sequences = HashSet::new();
    let mut named = 0usize;
    let mut in_range = 0usize;
    let mut refined = Vec::new();
    let mut accepted = Vec::new();

    for record in ordered {
        named += record.mapped_indices.len();
        if !seen_sequences.insert(record.sequence) {
            warn!(sequence = record.sequence, "duplicate mapping record ignored");
            continue;
        }

        let mut indices = Vec::new();
        for &raw in &record.mapped_indices {
            if raw < 1 || raw as u64 > count as u64 {
                warn!(sequence = record.sequence, index = raw, count, "out-of-range segment index discarded");
                continue;
            }
            in_range += 1;
            let index = raw as usize;
            if claimed[index - 1] {
                debug!(sequence = record.sequence, index, "segment already mapped");
                continue;
            }
            claimed[index - 1] = true;
            indices.push(index);
        }
        if indices.is_empty() {
            debug!(sequence = record.sequence, "mapping record left with no segments");
            continue;
        }
        indices.sort_unstable();

        let bbox = full_width_union(indices.iter().map(|&i| &pixel_segments[i - 1].bbox))?;
        let label = units
            .iter()
            .find(|unit| unit.sequence == record.sequence)
            .map(|unit| unit.description.clone())
            .unwrap_or_else(|| format!("Unit {}", record.sequence));
        refined.push(
            Segment::new(format!("refined-{}", record.sequence), label, bbox, SegmentKind::RefinedMerge)
                .with_parent_refs(indices.clone()),
        );
        accepted.push(MappingRecord {
            sequence: record.sequence,
            mapped_indices: indices.iter().map(|&i| i as i64).collect(),
        });
    }

    if named > 0 && in_range == 0 {
        let raw = serde_json::to_string(records)?;
        return Err(Error::response("mapping named no valid segment index", raw));
    }

    refined.extend(
        pixel_segments
            .iter()
            .zip(&claimed)
            .filter(|(_, claimed)| !**claimed)
            .map(|(segment, _)| segment.as_unmapped()),
    );
    refined.sort_by(|a, b| a.bbox.ymin.total_cmp(&b.bbox.ymin));
    for segment in &refined {
        segment.validate()?;
    }

    Ok((refined, accepted))
}
