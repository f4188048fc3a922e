mod common;

use common::{FakeAnalyzer, screenshot};
use scroll_vision::snapshot::{AnalysisState, segments_from_snapshot, serialize_for_snapshot};
use scroll_vision::{AnalysisSnapshot, DecompositionPipeline, PipelineConfig, RefinementConfig, SemanticOrchestrator};
use std::sync::Arc;

#[tokio::test]
async fn snapshot_round_trip_reproduces_boxes_and_crops() {
    let image = screenshot(64, 500, &[(20, 120), (140, 260), (300, 480)]);
    let config = PipelineConfig {
        invalid_threshold: 0.97,
        min_height_ratio: 0.02,
    };
    let report = DecompositionPipeline::new(config).unwrap().decompose(&image).unwrap();

    let analyzer = Arc::new(FakeAnalyzer::scripted(vec![
        Ok(r#"{"units":[{"sequence":1,"description":"Profile card"}]}"#.to_string()),
        Ok(r#"{"mappings":[{"sequence":1,"mappedIndices":[1,2]}]}"#.to_string()),
    ]));
    let mut orchestrator = SemanticOrchestrator::new(analyzer, RefinementConfig::default()).unwrap();
    let refined = orchestrator.refine(&image, &report).await.unwrap();

    let record = serialize_for_snapshot(&AnalysisState {
        source: &image,
        config,
        decomposition: &report,
        refinement: Some(&refined),
    })
    .unwrap();
    let json = serde_json::to_string(&record).unwrap();
    assert!(json.contains("\"box\""));
    assert!(json.contains("\"refinedMerge\""));

    let restored_record: AnalysisSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(restored_record, record);
    assert_eq!(restored_record.config(), config);

    let source = restored_record.source_image().unwrap();
    let restored = segments_from_snapshot(&restored_record, &source).unwrap();

    assert_eq!(restored.pixel_segments, report.pixel_segments());
    assert_eq!(restored.invalid_segments.len(), report.invalid_segments().len());
    assert_eq!(restored.separator_segments.len(), report.separator_segments().len());
    assert_eq!(restored.refined_segments, refined.refined_segments);
    for segment in restored.refined_segments.iter().chain(&restored.separator_segments) {
        let crop = segment.crop().unwrap();
        assert_eq!(crop.width(), image.width());
    }
}
