use framepipe::observability::{MetricsCollector, PipelineMonitor, RunOutcome, WorkerMetrics};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_monitor_report() {
    let collector = MetricsCollector::new();

    let m1 = Arc::new(WorkerMetrics::new("worker-0"));
    let m2 = Arc::new(WorkerMetrics::new("worker-1"));

    let start = m1.start_processing();
    m1.finish_processing(start);
    let start = m1.start_processing();
    m1.finish_processing(start);
    let start = m2.start_processing();
    m2.finish_processing(start);
    m2.record_error();

    collector.register(m1);
    collector.register(m2);

    let monitor = PipelineMonitor::new(collector).with_state("Processing");
    let report = monitor.generate_report();

    assert!(report.starts_with("=== Pipeline Report (Processing) ==="));
    assert!(report.contains("Workers: 2 | processed 3 | 1 error"));
    assert!(report.contains("2 frames"));
    assert!(report.contains("(66%)"));
    assert!(report.contains("(33%)"));
    assert!(report.find("worker-0") < report.find("worker-1"));
    assert!(!report.contains("Run:"));
}

#[test]
fn test_empty_monitor() {
    let monitor = PipelineMonitor::new(MetricsCollector::new());
    assert_eq!(
        monitor.generate_report(),
        "=== Pipeline Report ===\nNo workers registered\n"
    );
}

#[test]
fn test_report_includes_run_outcome() {
    let outcome = RunOutcome {
        frames_written: 8,
        skipped: vec![3, 7],
        duration: Duration::from_millis(1500),
        graceful_shutdown: false,
        aborted_workers: 1,
        discarded_units: 2,
    };
    let report = PipelineMonitor::new(MetricsCollector::new())
        .with_state("Done")
        .with_outcome(outcome)
        .generate_report();

    assert!(report.contains("Run: 8 frames written in 1.5s"));
    assert!(report.contains("skipped [3, 7]"));
    assert!(report.contains("shutdown forced (1 aborted)"));
    assert!(report.contains("2 discarded"));
}

#[test]
fn test_collector_totals() {
    let collector = MetricsCollector::new();
    let shared = collector.clone();

    let metrics = Arc::new(WorkerMetrics::new("worker-0"));
    shared.register(metrics.clone());

    for _ in 0..3 {
        let start = metrics.start_processing();
        metrics.finish_processing(start);
    }
    metrics.record_error();

    // clones share one registry
    assert_eq!(collector.total_processed(), 3);
    assert_eq!(collector.total_errors(), 1);
    let snapshot = collector.snapshot();
    assert_eq!(snapshot["worker-0"].frames_processed, 3);
}
