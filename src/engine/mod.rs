pub mod collector;
pub mod distributor;
pub mod orchestrator;
pub mod queue;
pub mod reorder;
pub mod state;
pub mod worker_pool;

pub use collector::{Collected, ResultCollector};
pub use distributor::WorkDistributor;
pub use orchestrator::{PipelineOrchestrator, RunReport};
pub use queue::{BoundedFrameQueue, Dequeued, QueueClosed};
pub use reorder::ReorderBuffer;
pub use state::PipelineState;
pub use worker_pool::{
    FrameHandle, FrameSubmitter, PoolSettings, ResultSlot, ShutdownReport, UnitOutcome, WorkerPool,
};
