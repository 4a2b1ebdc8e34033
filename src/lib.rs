pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod media;
pub mod observability;

pub use config::{AppConfig, CollectionPolicy, DistributionMode, PipelineConfig};
pub use engine::{PipelineOrchestrator, PipelineState, RunReport};
pub use error::{FailureReason, PipelineError, RunFailure, UnitFailure};
