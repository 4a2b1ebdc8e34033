use framepipe::config::PipelineConfig;
use framepipe::core::fn_processor;
use framepipe::engine::{PipelineOrchestrator, PipelineState};
use framepipe::error::PipelineError;
use framepipe::media::{MemoryDecoder, MemoryEncoder};

#[tokio::test]
async fn test_pipeline_state_transitions() {
    let processor = fn_processor(|x: u32| Ok(x + 1));
    let mut orchestrator = PipelineOrchestrator::new(PipelineConfig::default(), processor).unwrap();

    // Initially Idle
    assert_eq!(orchestrator.state().name(), "Idle");

    orchestrator
        .run(MemoryDecoder::new(vec![1, 2, 3]), MemoryEncoder::new("out"))
        .await
        .unwrap();

    match orchestrator.state() {
        PipelineState::Done {
            duration,
            total_frames,
        } => {
            assert_eq!(*total_frames, 3);
            assert!(duration.is_some());
        }
        other => panic!("expected Done, got {}", other.name()),
    }

    orchestrator.reset().unwrap();
    assert_eq!(orchestrator.state(), &PipelineState::Idle);
}

#[test]
fn test_invalid_transition_rejected() {
    let processor = fn_processor(|x: u32| Ok(x));
    let mut orchestrator = PipelineOrchestrator::new(PipelineConfig::default(), processor).unwrap();

    let err = orchestrator
        .transition_to(PipelineState::Collecting { expected: 1 })
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidTransition { .. }));
    assert_eq!(err.to_string(), "Invalid state transition: Idle -> Collecting");
    assert_eq!(orchestrator.state().name(), "Idle");
}

#[test]
fn test_state_serializes_without_timings() {
    let state = PipelineState::Failed {
        stage: "Processing".to_string(),
        error_msg: "cancelled".to_string(),
    };
    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["Failed"]["stage"], "Processing");

    let done = PipelineState::Done {
        duration: None,
        total_frames: 3,
    };
    let json = serde_json::to_value(&done).unwrap();
    assert!(json["Done"].get("duration").is_none());
}
