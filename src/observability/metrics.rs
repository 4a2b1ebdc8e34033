use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for one worker, updated lock-free from its task
pub struct WorkerMetrics {
    worker_id: String,
    frames_processed: AtomicU64,
    errors_count: AtomicU64,
    total_latency_us: AtomicU64,
    latency_samples: AtomicU64,
}

impl WorkerMetrics {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            frames_processed: AtomicU64::new(0),
            errors_count: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn errors_count(&self) -> u64 {
        self.errors_count.load(Ordering::Relaxed)
    }

    pub fn start_processing(&self) -> Instant {
        Instant::now()
    }

    /// Record a successful frame and return how long it took
    pub fn finish_processing(&self, start: Instant) -> Duration {
        let elapsed = start.elapsed();
        self.total_latency_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        elapsed
    }

    pub fn record_error(&self) {
        self.errors_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_us(&self) -> u64 {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.total_latency_us.load(Ordering::Relaxed) / samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = WorkerMetrics::new("worker-0");
        assert_eq!(metrics.avg_latency_us(), 0);

        let start = metrics.start_processing();
        metrics.finish_processing(start);
        metrics.record_error();

        assert_eq!(metrics.worker_id(), "worker-0");
        assert_eq!(metrics.frames_processed(), 1);
        assert_eq!(metrics.errors_count(), 1);
    }
}
