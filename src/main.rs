use anyhow::{Context, Result};
use framepipe::config::AppConfig;
use framepipe::engine::PipelineOrchestrator;
use framepipe::media::{
    BorderColorProcessor, BorderTrackingEncoder, RawVideoDecoder, RawVideoEncoder,
};
use log::{info, warn};

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let path = std::env::args()
        .nth(1)
        .context("usage: framepipe <config.json>")?;
    let config = AppConfig::from_file(&path)?;

    let input = config
        .pipeline
        .input
        .clone()
        .context("pipeline.input is not set")?;
    let output = config
        .pipeline
        .output
        .clone()
        .context("pipeline.output is not set")?;

    let geometry = config.video;
    let decoder = RawVideoDecoder::open(&input, geometry).await?;
    let encoder = BorderTrackingEncoder::new(RawVideoEncoder::new(&output).with_geometry(geometry));
    let borders = encoder.summary();
    let mut orchestrator =
        PipelineOrchestrator::new(config.pipeline, BorderColorProcessor::new(geometry))?;

    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    let result = orchestrator.run(decoder, encoder).await;
    let mut monitor = orchestrator.monitor();
    if let Ok(report) = &result {
        monitor = monitor.with_outcome(report.outcome());
    }
    print!("{}", monitor.generate_report());

    let report = result?;
    let mean = borders
        .mean()
        .map_or_else(|| "n/a".to_string(), |rgb| rgb.to_string());
    info!(
        "Processed {} frame(s) from {} into {} in {:?}, mean border colour {}",
        report.frames, input, report.output, report.duration, mean
    );
    if !report.skipped.is_empty() {
        warn!("{} frame(s) skipped", report.skipped.len());
    }
    Ok(())
}
