mod common;

use common::{FakeAnalyzer, region_indices, screenshot};
use scroll_vision::refinement::orchestrator::local_merge;
use scroll_vision::refinement::prompts::STRUCTURAL_INSTRUCTION;
use scroll_vision::refinement::response::{MappingRecord, StructuralUnit};
use scroll_vision::{
    BoundingBox, DecompositionPipeline, Error, MappingStrategy, PipelineConfig, RefinementConfig, RefinementStage,
    Resilience, Segment, SegmentKind, SemanticOrchestrator, TransientKind,
};
use std::sync::Arc;
use std::time::Duration;

const STRUCTURAL: &str = r#"{"units":[{"sequence":1,"description":"Header"},{"sequence":2,"description":"Feed"}]}"#;

fn orchestrator(analyzer: Arc<FakeAnalyzer>, config: RefinementConfig) -> SemanticOrchestrator {
    let retry = config.retry;
    SemanticOrchestrator::new(analyzer, config)
        .unwrap()
        .with_resilience(Resilience::with_jitter(retry, |_| 0))
}

#[test]
fn mapped_segments_merge_into_full_width_union() {
    let pixel = |n: usize, ymin: f64, ymax: f64| {
        Segment::new(
            format!("content-{n}"),
            format!("Block {n}"),
            BoundingBox::band(ymin, ymax).unwrap(),
            SegmentKind::PixelContent,
        )
    };
    let segments = [pixel(1, 0.0, 100.0), pixel(2, 100.0, 250.0), pixel(3, 400.0, 500.0)];
    let units = [StructuralUnit { sequence: 1, description: "Header".into() }];
    let records = [MappingRecord { sequence: 1, mapped_indices: vec![1, 2] }];

    let (refined, _) = local_merge(&segments, &units, &records).unwrap();
    let spans: Vec<(f64, f64, bool)> = refined.iter().map(|s| (s.bbox.ymin, s.bbox.ymax, s.unmapped)).collect();
    assert_eq!(spans, vec![(0.0, 250.0, false), (400.0, 500.0, true)]);
}

#[tokio::test]
async fn annotated_preview_refinement_runs_all_three_steps() {
    let image = screenshot(100, 1000, &[(0, 100), (110, 250), (400, 500)]);
    let report = DecompositionPipeline::new(PipelineConfig::default()).unwrap().decompose(&image).unwrap();
    assert_eq!(report.pixel_segments().len(), 3);

    let analyzer = Arc::new(FakeAnalyzer::scripted(vec![
        Ok(STRUCTURAL.to_string()),
        Ok("```json\n{\"mappings\":[{\"sequence\":1,\"mappedIndices\":[1,2]}]}\n```".to_string()),
    ]));
    let mut orchestrator = orchestrator(analyzer.clone(), RefinementConfig::default());
    let refined = orchestrator.refine(&image, &report).await.unwrap();

    assert_eq!(orchestrator.stage(), RefinementStage::LocalMergeComplete);
    assert_eq!(refined.stage, RefinementStage::LocalMergeComplete);
    assert_eq!(refined.structural_units.len(), 2);
    assert_eq!(refined.refined_segments.len(), 2);

    let merged = &refined.refined_segments[0];
    assert_eq!(merged.id, "refined-1");
    assert_eq!(merged.label, "Header");
    assert_eq!((merged.bbox.ymin, merged.bbox.ymax), (0.0, 250.0));
    assert_eq!(merged.parent_refs, Some(vec![1, 2]));
    assert!(merged.crop().is_some());
    assert!(refined.refined_segments[1].unmapped);
    assert_eq!(refined.completeness, 100);

    let calls = analyzer.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].instruction, STRUCTURAL_INSTRUCTION);
    assert!(calls[1].instruction.contains("numbered 1 to 3"));
    assert!(calls.iter().all(|c| c.images == 1));
}

#[tokio::test(start_paused = true)]
async fn rate_limited_calls_back_off_exponentially() {
    let image = screenshot(80, 400, &[(40, 120), (200, 300)]);
    let report = DecompositionPipeline::new(PipelineConfig::default()).unwrap().decompose(&image).unwrap();

    let mut responses: Vec<scroll_vision::Result<String>> = (0..4)
        .map(|_| Err(Error::transient(TransientKind::RateLimit, "HTTP 429")))
        .collect();
    responses.push(Ok(STRUCTURAL.to_string()));
    responses.push(Ok(r#"{"mappings":[]}"#.to_string()));
    let analyzer = Arc::new(FakeAnalyzer::scripted(responses));

    let mut orchestrator = orchestrator(analyzer.clone(), RefinementConfig::default());
    let refined = orchestrator.refine(&image, &report).await.unwrap();
    assert!(refined.refined_segments.iter().all(|s| s.unmapped));

    let calls = analyzer.calls();
    assert_eq!(calls.len(), 6);
    let expected = [2500, 5000, 10_000, 20_000];
    for (i, millis) in expected.iter().enumerate() {
        let gap = calls[i + 1].at - calls[i].at;
        let want = Duration::from_millis(*millis);
        assert!(gap >= want && gap < want + Duration::from_millis(5), "gap {i}: {gap:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_end_in_error_stage() {
    let image = screenshot(80, 400, &[(40, 120)]);
    let report = DecompositionPipeline::new(PipelineConfig::default()).unwrap().decompose(&image).unwrap();
    let analyzer = Arc::new(FakeAnalyzer::new(|_| {
        Err(Error::transient(TransientKind::ServerFault, "HTTP 503"))
    }));

    let mut orchestrator = orchestrator(analyzer.clone(), RefinementConfig::default());
    let result = orchestrator.refine(&image, &report).await;

    assert!(matches!(result, Err(Error::ServiceUnavailable { attempts: 5, .. })));
    assert_eq!(orchestrator.stage(), RefinementStage::Error);
    assert_eq!(analyzer.calls().len(), 5);
    // Pixel results are untouched by a failed refinement.
    assert_eq!(report.pixel_segments().len(), 1);
}

#[tokio::test]
async fn malformed_structural_response_is_not_retried() {
    let image = screenshot(80, 400, &[(40, 120)]);
    let report = DecompositionPipeline::new(PipelineConfig::default()).unwrap().decompose(&image).unwrap();
    let analyzer = Arc::new(FakeAnalyzer::new(|_| Ok("I could not find any units.".to_string())));

    let mut orchestrator = orchestrator(analyzer.clone(), RefinementConfig::default());
    let result = orchestrator.refine(&image, &report).await;

    match result {
        Err(Error::ServiceResponse { raw, .. }) => assert_eq!(raw, "I could not find any units."),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(orchestrator.stage(), RefinementStage::Error);
    assert_eq!(analyzer.calls().len(), 1);
}

#[tokio::test]
async fn blank_screenshot_needs_no_collaborator() {
    let image = screenshot(80, 400, &[]);
    let report = DecompositionPipeline::new(PipelineConfig::default()).unwrap().decompose(&image).unwrap();
    let analyzer = Arc::new(FakeAnalyzer::new(|_| panic!("collaborator must not be called")));

    let mut orchestrator = orchestrator(analyzer.clone(), RefinementConfig::default());
    let refined = orchestrator.refine(&image, &report).await.unwrap();

    assert!(refined.refined_segments.is_empty());
    assert_eq!(refined.stage, RefinementStage::LocalMergeComplete);
    assert_eq!(refined.completeness, 100);
    assert!(analyzer.calls().is_empty());
}

#[tokio::test]
async fn pairwise_relevance_merges_related_neighbours() {
    let image = screenshot(100, 1000, &[(50, 150), (170, 300), (350, 500), (520, 700)]);
    let report = DecompositionPipeline::new(PipelineConfig::default()).unwrap().decompose(&image).unwrap();
    assert_eq!(report.pixel_segments().len(), 4);

    let analyzer = Arc::new(FakeAnalyzer::new(|instruction| {
        if instruction == STRUCTURAL_INSTRUCTION {
            return Ok(STRUCTURAL.to_string());
        }
        let (upper, lower) = region_indices(instruction);
        let related = matches!((upper.last(), lower.first()), (Some(1), Some(2)) | (Some(3), Some(4)));
        Ok(format!("{{\"related\": {related}}}"))
    }));
    let config = RefinementConfig {
        strategy: MappingStrategy::PairwiseRelevance,
        batch_size: 2,
        concurrency_limit: 2,
        ..RefinementConfig::default()
    };
    let mut orchestrator = orchestrator(analyzer.clone(), config);
    let refined = orchestrator.refine(&image, &report).await.unwrap();

    let summary: Vec<(&str, Option<Vec<usize>>)> = refined
        .refined_segments
        .iter()
        .map(|s| (s.label.as_str(), s.parent_refs.clone()))
        .collect();
    assert_eq!(summary, vec![("Header", Some(vec![1, 2])), ("Feed", Some(vec![3, 4]))]);
    assert_eq!((refined.refined_segments[0].bbox.ymin, refined.refined_segments[0].bbox.ymax), (50.0, 300.0));

    let calls = analyzer.calls();
    // One structural call plus one question per group.
    assert_eq!(calls.len(), 3);
    assert!(calls[1..].iter().all(|c| c.images == 2 && c.instruction.contains("1. Header")));
}

#[tokio::test]
async fn pairwise_groups_stay_distinct_when_unit_sequences_repeat() {
    let image = screenshot(100, 1000, &[(50, 150), (170, 300), (350, 500), (520, 700)]);
    let report = DecompositionPipeline::new(PipelineConfig::default()).unwrap().decompose(&image).unwrap();

    let analyzer = Arc::new(FakeAnalyzer::new(|instruction| {
        if instruction == STRUCTURAL_INSTRUCTION {
            return Ok(r#"{"units":[{"sequence":1,"description":"A"},{"sequence":1,"description":"B"}]}"#.to_string());
        }
        let (upper, lower) = region_indices(instruction);
        let related = matches!((upper.last(), lower.first()), (Some(1), Some(2)) | (Some(3), Some(4)));
        Ok(format!("{{\"related\": {related}}}"))
    }));
    let config = RefinementConfig {
        strategy: MappingStrategy::PairwiseRelevance,
        batch_size: 2,
        concurrency_limit: 2,
        ..RefinementConfig::default()
    };
    let mut orchestrator = orchestrator(analyzer, config);
    let refined = orchestrator.refine(&image, &report).await.unwrap();

    let summary: Vec<(SegmentKind, &str, Option<Vec<usize>>)> = refined
        .refined_segments
        .iter()
        .map(|s| (s.kind, s.label.as_str(), s.parent_refs.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (SegmentKind::RefinedMerge, "A", Some(vec![1, 2])),
            (SegmentKind::RefinedMerge, "B", Some(vec![3, 4])),
        ]
    );
    assert!(refined.refined_segments.iter().all(|s| !s.unmapped));
    assert_eq!(refined.mappings.len(), 2);
    assert_ne!(refined.mappings[0].sequence, refined.mappings[1].sequence);
}
