use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use super::WorkerMetrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub worker_id: String,
    pub frames_processed: u64,
    pub errors_count: u64,
    pub avg_latency_us: u64,
}

/// Registry of per-worker metrics; clones share the same registry
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<Mutex<HashMap<String, Arc<WorkerMetrics>>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, metrics: Arc<WorkerMetrics>) {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(metrics.worker_id().to_string(), metrics);
    }

    pub fn snapshot(&self) -> HashMap<String, MetricsSnapshot> {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(id, metrics)| {
                (
                    id.clone(),
                    MetricsSnapshot {
                        worker_id: metrics.worker_id().to_string(),
                        frames_processed: metrics.frames_processed(),
                        errors_count: metrics.errors_count(),
                        avg_latency_us: metrics.avg_latency_us(),
                    },
                )
            })
            .collect()
    }

    pub fn get_worker_metrics(&self, worker_id: &str) -> Option<Arc<WorkerMetrics>> {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(worker_id)
            .cloned()
    }

    /// Frames processed successfully across all workers
    pub fn total_processed(&self) -> u64 {
        self.snapshot().values().map(|s| s.frames_processed).sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.snapshot().values().map(|s| s.errors_count).sum()
    }
}
