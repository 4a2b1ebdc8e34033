use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use crate::error::PipelineError;
use crate::media::FrameGeometry;

/// How frames are handed to workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMode {
    /// Read the whole stream, then give each worker a contiguous range
    Static,
    /// Workers pull from one bounded queue while the stream is still being read
    #[default]
    Shared,
}

/// What the collector does with frames that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollectionPolicy {
    /// Any failed frame fails the run
    #[default]
    FailFast,
    /// Failed frames are reported and left out of the output
    BestEffort,
}

/// Process-wide pipeline settings, fixed for the lifetime of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub dequeue_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
    pub collect_timeout_ms: u64,
    /// No deadline when absent
    pub run_deadline_ms: Option<u64>,
    pub distribution: DistributionMode,
    pub collection: CollectionPolicy,
    pub input: Option<String>,
    pub output: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 50,
            dequeue_timeout_ms: 2_000,
            shutdown_grace_ms: 60_000,
            collect_timeout_ms: 300_000,
            run_deadline_ms: None,
            distribution: DistributionMode::Shared,
            collection: CollectionPolicy::FailFast,
            input: None,
            output: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(config: Value) -> Result<Self, PipelineError> {
        let config: Self = serde_json::from_value(config)
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        Self::from_json(read_json(path.as_ref())?)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.workers == 0 {
            return Err(PipelineError::Config("workers must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(PipelineError::Config(
                "queue_capacity must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("dequeue_timeout_ms", self.dequeue_timeout_ms),
            ("shutdown_grace_ms", self.shutdown_grace_ms),
            ("collect_timeout_ms", self.collect_timeout_ms),
        ] {
            if value == 0 {
                return Err(PipelineError::Config(format!("{} must be non-zero", name)));
            }
        }
        if self.run_deadline_ms == Some(0) {
            return Err(PipelineError::Config(
                "run_deadline_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_millis(self.collect_timeout_ms)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_ms.map(Duration::from_millis)
    }
}

/// Configuration file of the `framepipe` binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub video: FrameGeometry,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let config: Self = serde_json::from_value(read_json(path.as_ref())?)
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        config.pipeline.validate()?;
        if config.video.frame_size() == 0 {
            return Err(PipelineError::Config(
                "video width and height must be non-zero".into(),
            ));
        }
        Ok(config)
    }
}

fn read_json(path: &Path) -> Result<Value, PipelineError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&text)
        .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = PipelineConfig::from_json(json!({ "workers": 8 })).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.queue_capacity, 50);
        assert_eq!(config.dequeue_timeout(), Duration::from_secs(2));
        assert_eq!(config.distribution, DistributionMode::Shared);
        assert_eq!(config.collection, CollectionPolicy::FailFast);
        assert!(config.run_deadline().is_none());
    }

    #[test]
    fn test_modes_parse_from_snake_case() {
        let config = PipelineConfig::from_json(json!({
            "distribution": "static",
            "collection": "best_effort",
            "run_deadline_ms": 1500
        }))
        .unwrap();
        assert_eq!(config.distribution, DistributionMode::Static);
        assert_eq!(config.collection, CollectionPolicy::BestEffort);
        assert_eq!(config.run_deadline(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = PipelineConfig::from_json(json!({ "workers": 0 }));
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = PipelineConfig::from_json(json!({ "queue_capacity": 0 }));
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_app_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("framepipe.json");
        std::fs::write(
            &path,
            r#"{ "pipeline": { "workers": 2, "input": "in.rgb", "output": "out.rgb" },
                 "video": { "width": 4, "height": 2 } }"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(config.pipeline.input.as_deref(), Some("in.rgb"));
        assert_eq!(config.video.frame_size(), 24);
    }
}
