use framepipe::config::{DistributionMode, PipelineConfig};
use framepipe::core::{FrameDecoder, FrameEncoder};
use framepipe::engine::PipelineOrchestrator;
use framepipe::media::{
    BorderColorProcessor, BorderTrackingEncoder, FrameGeometry, RawVideoDecoder, RawVideoEncoder,
    Rgb,
};

const GEOMETRY: FrameGeometry = FrameGeometry {
    width: 4,
    height: 3,
};

/// `count` frames where every byte of frame `i` is `i`
fn video(count: u8) -> Vec<u8> {
    (0..count)
        .flat_map(|i| std::iter::repeat(i).take(GEOMETRY.frame_size()))
        .collect()
}

#[tokio::test]
async fn test_decoder_reads_whole_frames() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("in.rgb");
    std::fs::write(&path, video(3)).unwrap();

    let mut decoder = RawVideoDecoder::open(&path, GEOMETRY).await.unwrap();
    for i in 0..3u8 {
        let frame = decoder.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.len(), GEOMETRY.frame_size());
        assert!(frame.iter().all(|b| *b == i));
    }
    assert!(decoder.next_frame().await.unwrap().is_none());
    assert_eq!(decoder.frames_read(), 3);
}

#[tokio::test]
async fn test_decoder_recycles_buffers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("in.rgb");
    std::fs::write(&path, video(4)).unwrap();

    let mut decoder = RawVideoDecoder::open(&path, GEOMETRY).await.unwrap();
    let first = decoder.next_frame().await.unwrap().unwrap();
    assert_eq!(decoder.pool().idle(), 0);
    drop(first);
    assert_eq!(decoder.pool().idle(), 1);

    let _second = decoder.next_frame().await.unwrap().unwrap();
    assert_eq!(decoder.pool().idle(), 0);
}

#[tokio::test]
async fn test_truncated_trailing_frame_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("in.rgb");
    let mut bytes = video(2);
    bytes.truncate(bytes.len() - 5);
    std::fs::write(&path, bytes).unwrap();

    let mut decoder = RawVideoDecoder::open(&path, GEOMETRY).await.unwrap();
    assert!(decoder.next_frame().await.unwrap().is_some());
    let err = decoder.next_frame().await.unwrap_err();
    assert!(err.to_string().contains("Truncated frame 1"));
}

#[tokio::test]
async fn test_missing_input_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = RawVideoDecoder::open(dir.path().join("absent.rgb"), GEOMETRY).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_encoder_creates_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("out.rgb");

    let mut encoder = RawVideoEncoder::new(&path).with_geometry(GEOMETRY);
    encoder.append_frame(vec![7u8; GEOMETRY.frame_size()]).await.unwrap();
    let output = encoder.finalize().await.unwrap();

    assert_eq!(output, path.display().to_string());
    assert_eq!(std::fs::read(&path).unwrap(), vec![7u8; GEOMETRY.frame_size()]);
    assert_eq!(encoder.frames_written(), 1);
}

#[tokio::test]
async fn test_encoder_rejects_wrong_size() {
    let dir = tempfile::tempdir().unwrap();
    let mut encoder = RawVideoEncoder::new(dir.path().join("out.rgb")).with_geometry(GEOMETRY);
    assert!(encoder.append_frame(vec![0u8; 5]).await.is_err());
}

#[tokio::test]
async fn test_border_pipeline_copies_video() {
    for distribution in [DistributionMode::Static, DistributionMode::Shared] {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.rgb");
        let output = dir.path().join("out").join("result.rgb");
        let bytes = video(20);
        std::fs::write(&input, &bytes).unwrap();

        let config = PipelineConfig {
            workers: 3,
            distribution,
            ..Default::default()
        };
        let mut orchestrator =
            PipelineOrchestrator::new(config, BorderColorProcessor::new(GEOMETRY)).unwrap();

        let decoder = RawVideoDecoder::open(&input, GEOMETRY).await.unwrap();
        let encoder =
            BorderTrackingEncoder::new(RawVideoEncoder::new(&output).with_geometry(GEOMETRY));
        let borders = encoder.summary();
        let report = orchestrator.run(decoder, encoder).await.unwrap();

        assert_eq!(report.frames, 20);
        assert_eq!(report.output, output.display().to_string());
        assert_eq!(std::fs::read(&output).unwrap(), bytes);
        // frame i is solid i, so the mean over 0..20 truncates to 9
        assert_eq!(borders.frames(), 20);
        assert_eq!(borders.mean(), Some(Rgb { r: 9, g: 9, b: 9 }));
    }
}

#[tokio::test]
async fn test_failed_run_writes_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.rgb");
    let output = dir.path().join("out.rgb");
    // frames are 4x3 but the processor expects 2x2
    std::fs::write(&input, video(3)).unwrap();

    let mut orchestrator = PipelineOrchestrator::new(
        PipelineConfig::default(),
        BorderColorProcessor::new(FrameGeometry::new(2, 2)),
    )
    .unwrap();
    let decoder = RawVideoDecoder::open(&input, GEOMETRY).await.unwrap();
    let failure = orchestrator
        .run(decoder, RawVideoEncoder::new(&output))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, "Collecting");
    assert!(!output.exists());
}
