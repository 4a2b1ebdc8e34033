use std::fmt::Write;
use std::time::Duration;

use super::{MetricsCollector, MetricsSnapshot};

/// How a finished run ended, as shown under the worker table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub frames_written: u64,
    /// Sequence numbers left out under best-effort collection
    pub skipped: Vec<u64>,
    pub duration: Duration,
    pub graceful_shutdown: bool,
    pub aborted_workers: usize,
    pub discarded_units: usize,
}

/// Plain-text report over a run's worker metrics
pub struct PipelineMonitor {
    collector: MetricsCollector,
    state: Option<String>,
    outcome: Option<RunOutcome>,
}

impl PipelineMonitor {
    pub fn new(collector: MetricsCollector) -> Self {
        Self {
            collector,
            state: None,
            outcome: None,
        }
    }

    /// Name the pipeline state in the report header
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_outcome(mut self, outcome: RunOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn generate_report(&self) -> String {
        let mut report = match &self.state {
            Some(state) => format!("=== Pipeline Report ({}) ===\n", state),
            None => String::from("=== Pipeline Report ===\n"),
        };

        let mut workers: Vec<MetricsSnapshot> = self.collector.snapshot().into_values().collect();
        workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));

        if workers.is_empty() {
            report.push_str("No workers registered\n");
        } else {
            push_workers(&mut report, &workers);
        }

        if let Some(outcome) = &self.outcome {
            push_outcome(&mut report, outcome);
        }
        report
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }
}

fn push_workers(report: &mut String, workers: &[MetricsSnapshot]) {
    let processed: u64 = workers.iter().map(|w| w.frames_processed).sum();
    let errors: u64 = workers.iter().map(|w| w.errors_count).sum();
    let weighted: u64 = workers
        .iter()
        .map(|w| w.avg_latency_us * w.frames_processed)
        .sum();
    let avg = if processed > 0 { weighted / processed } else { 0 };

    let _ = writeln!(
        report,
        "Workers: {} | processed {} | {} | avg latency {}μs",
        workers.len(),
        processed,
        plural(errors, "error"),
        avg
    );
    for w in workers {
        let share = if processed > 0 {
            w.frames_processed * 100 / processed
        } else {
            0
        };
        let _ = writeln!(
            report,
            "  {:<10} {:>6} | {:>9} | avg {}μs ({}%)",
            w.worker_id,
            plural(w.frames_processed, "frame"),
            plural(w.errors_count, "error"),
            w.avg_latency_us,
            share
        );
    }
}

fn push_outcome(report: &mut String, outcome: &RunOutcome) {
    let _ = write!(
        report,
        "Run: {} written in {:?}",
        plural(outcome.frames_written, "frame"),
        outcome.duration
    );
    if !outcome.skipped.is_empty() {
        let _ = write!(report, ", skipped {:?}", outcome.skipped);
    }
    if outcome.graceful_shutdown {
        report.push_str(", shutdown graceful");
    } else {
        let _ = write!(
            report,
            ", shutdown forced ({} aborted)",
            outcome.aborted_workers
        );
    }
    if outcome.discarded_units > 0 {
        let _ = write!(report, ", {} discarded", outcome.discarded_units);
    }
    report.push('\n');
}

fn plural(count: u64, noun: &str) -> String {
    if count == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", count, noun)
    }
}
