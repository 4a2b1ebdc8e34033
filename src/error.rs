//! Error types for the frame pipeline

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why a single frame never produced a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The processing function returned an error
    Processing(String),
    /// The processing function panicked
    Panicked(String),
    /// Discarded after cancellation, before a worker picked it up
    Cancelled,
    /// Not resolved before the collection timeout
    TimedOut,
    /// The worker holding it went away without reporting (forced shutdown)
    Abandoned,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing(cause) => write!(f, "processing failed: {}", cause),
            Self::Panicked(msg) => write!(f, "processor panicked: {}", msg),
            Self::Cancelled => write!(f, "cancelled before processing"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Abandoned => write!(f, "abandoned by its worker"),
        }
    }
}

/// Per-frame failure, captured at the worker and attached to the frame's result slot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("frame {sequence}: {reason}")]
pub struct UnitFailure {
    pub sequence: u64,
    pub reason: FailureReason,
}

impl UnitFailure {
    pub fn new(sequence: u64, reason: FailureReason) -> Self {
        Self { sequence, reason }
    }

    pub fn processing(sequence: u64, error: &anyhow::Error) -> Self {
        Self::new(sequence, FailureReason::Processing(format!("{:#}", error)))
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No frames to distribute")]
    EmptyInput,

    #[error("Collection failed: {}", describe_collection(.failures, .unresolved))]
    Collection {
        failures: Vec<UnitFailure>,
        unresolved: Vec<u64>,
    },

    #[error("Decoder failed: {0}")]
    Decode(#[source] anyhow::Error),

    #[error("Encoder rejected frame {sequence}: {source}")]
    EncodeRejection {
        sequence: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("Encoder failed to finalize output: {0}")]
    FinalizeRejection(#[source] anyhow::Error),

    #[error("Run cancelled after {completed} frame(s) processed, {discarded} discarded")]
    Cancelled { completed: u64, discarded: usize },

    #[error("Run exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Worker pool is not accepting frames")]
    PoolClosed,

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Sequence numbers that failed or never completed, for collection errors
    pub fn failed_sequences(&self) -> Vec<u64> {
        match self {
            Self::Collection {
                failures,
                unresolved,
            } => {
                let mut all: Vec<u64> = failures
                    .iter()
                    .map(|f| f.sequence)
                    .chain(unresolved.iter().copied())
                    .collect();
                all.sort_unstable();
                all
            }
            _ => Vec::new(),
        }
    }
}

fn describe_collection(failures: &[UnitFailure], unresolved: &[u64]) -> String {
    let mut parts: Vec<String> = failures.iter().map(|f| f.to_string()).collect();
    if !unresolved.is_empty() {
        parts.push(format!("never completed: {:?}", unresolved));
    }
    parts.join("; ")
}

/// Terminal error of a pipeline run: the stage it failed in, and why
#[derive(Debug, Error)]
#[error("Pipeline failed during {stage}: {error}")]
pub struct RunFailure {
    pub stage: String,
    #[source]
    pub error: PipelineError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_error_lists_sequences() {
        let err = PipelineError::Collection {
            failures: vec![UnitFailure::new(7, FailureReason::Processing("bad pixel".into()))],
            unresolved: vec![9, 8],
        };

        assert_eq!(err.failed_sequences(), vec![7, 8, 9]);
        let msg = err.to_string();
        assert!(msg.contains("frame 7"));
        assert!(msg.contains("bad pixel"));
        assert!(msg.contains("[9, 8]"));
    }

    #[test]
    fn test_run_failure_names_stage() {
        let failure = RunFailure {
            stage: "Collecting".to_string(),
            error: PipelineError::EmptyInput,
        };
        assert_eq!(
            failure.to_string(),
            "Pipeline failed during Collecting: No frames to distribute"
        );
    }
}
