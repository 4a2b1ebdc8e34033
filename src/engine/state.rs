use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Pipeline run states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Ingesting,
    Distributing {
        workers: usize,
    },
    Processing {
        #[serde(skip)]
        started_at: Option<Instant>,
    },
    Collecting {
        expected: usize,
    },
    Reassembling {
        frames: usize,
    },
    Done {
        #[serde(skip)]
        duration: Option<Duration>,
        total_frames: u64,
    },
    /// Absorbing: a failed orchestrator cannot be reused
    Failed {
        stage: String,
        error_msg: String,
    },
}

impl PipelineState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, target),
            // Forward path
            (Idle, Ingesting) |
            (Ingesting, Distributing { .. }) |
            (Distributing { .. }, Processing { .. }) |
            (Processing { .. }, Collecting { .. }) |
            (Collecting { .. }, Reassembling { .. }) |
            (Reassembling { .. }, Done { .. }) |

            // Any active stage can fail
            (Ingesting, Failed { .. }) |
            (Distributing { .. }, Failed { .. }) |
            (Processing { .. }, Failed { .. }) |
            (Collecting { .. }, Failed { .. }) |
            (Reassembling { .. }, Failed { .. }) |

            // Reuse after success
            (Done { .. }, Idle)
        )
    }

    /// Get human-readable state name
    pub fn name(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Ingesting => "Ingesting",
            Self::Distributing { .. } => "Distributing",
            Self::Processing { .. } => "Processing",
            Self::Collecting { .. } => "Collecting",
            Self::Reassembling { .. } => "Reassembling",
            Self::Done { .. } => "Done",
            Self::Failed { .. } => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }
}
