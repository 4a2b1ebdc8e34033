use futures::FutureExt;
use log::{debug, info, trace, warn};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::queue::{BoundedFrameQueue, Dequeued};
use crate::config::PipelineConfig;
use crate::core::{FrameProcessor, FrameUnit, ProcessedFrameUnit};
use crate::error::{FailureReason, PipelineError, UnitFailure};
use crate::observability::{MetricsCollector, WorkerMetrics};

/// How long cancelled workers get to reach a safe point before they are aborted
const CANCEL_SETTLE: Duration = Duration::from_millis(500);

pub type UnitOutcome<R> = Result<ProcessedFrameUnit<R>, UnitFailure>;

/// Write side of a frame's result; completing it resolves the matching `FrameHandle`
pub struct ResultSlot<R> {
    sequence: u64,
    tx: oneshot::Sender<UnitOutcome<R>>,
}

impl<R> ResultSlot<R> {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn complete(self, outcome: UnitOutcome<R>) {
        if self.tx.send(outcome).is_err() {
            debug!("Result for frame {} dropped, nobody is waiting", self.sequence);
        }
    }
}

/// Eventual result of one submitted frame
pub struct FrameHandle<R> {
    sequence: u64,
    rx: oneshot::Receiver<UnitOutcome<R>>,
}

impl<R> FrameHandle<R> {
    /// A connected slot/handle pair for frame `sequence`
    pub fn channel(sequence: u64) -> (ResultSlot<R>, FrameHandle<R>) {
        let (tx, rx) = oneshot::channel();
        (ResultSlot { sequence, tx }, FrameHandle { sequence, rx })
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Wait for the result. A slot dropped without completing reads as `Abandoned`.
    pub async fn wait(self) -> UnitOutcome<R> {
        let sequence = self.sequence;
        self.rx
            .await
            .unwrap_or_else(|_| Err(UnitFailure::new(sequence, FailureReason::Abandoned)))
    }
}

struct Job<P, R> {
    unit: FrameUnit<P>,
    slot: ResultSlot<R>,
}

impl<P, R> Job<P, R> {
    fn new(unit: FrameUnit<P>) -> (Self, FrameHandle<R>) {
        let (slot, handle) = FrameHandle::channel(unit.sequence());
        (Self { unit, slot }, handle)
    }

    fn discard(self, discarded: &AtomicUsize) {
        discarded.fetch_add(1, Ordering::Relaxed);
        let sequence = self.unit.sequence();
        self.slot
            .complete(Err(UnitFailure::new(sequence, FailureReason::Cancelled)));
    }
}

type JobQueue<Proc> =
    BoundedFrameQueue<Job<<Proc as FrameProcessor>::Input, <Proc as FrameProcessor>::Output>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub dequeue_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl PoolSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
            dequeue_timeout: config.dequeue_timeout(),
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every worker exited within the grace period
    pub graceful: bool,
    pub aborted_workers: usize,
    /// Queued frames that no worker picked up
    pub discarded_units: usize,
}

/// Producer-side handle for feeding a shared-queue pool from another task
pub struct FrameSubmitter<P, R> {
    queue: Option<BoundedFrameQueue<Job<P, R>>>,
    accepting: Arc<AtomicBool>,
    submitted: Arc<AtomicUsize>,
}

impl<P: Send, R: Send> FrameSubmitter<P, R> {
    /// Queue a frame for processing; waits only while the queue is full
    pub async fn submit(&self, unit: FrameUnit<P>) -> Result<FrameHandle<R>, PipelineError> {
        let queue = match &self.queue {
            Some(queue) if self.accepting.load(Ordering::Acquire) => queue,
            _ => return Err(PipelineError::PoolClosed),
        };

        let (job, handle) = Job::new(unit);
        queue
            .enqueue(job)
            .await
            .map_err(|_| PipelineError::PoolClosed)?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }
}

impl<P, R> Clone for FrameSubmitter<P, R> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            accepting: self.accepting.clone(),
            submitted: self.submitted.clone(),
        }
    }
}

/// Fixed set of worker tasks running one `FrameProcessor`.
///
/// Shared-queue pools take frames through `submit`; static pools are handed
/// their whole assignment up front. Either way every frame resolves exactly
/// one `FrameHandle`.
pub struct WorkerPool<Proc: FrameProcessor> {
    settings: PoolSettings,
    queue: Option<JobQueue<Proc>>,
    accepting: Arc<AtomicBool>,
    cancel: CancellationToken,
    discarded: Arc<AtomicUsize>,
    submitted: Arc<AtomicUsize>,
    workers: Vec<JoinHandle<()>>,
}

impl<Proc: FrameProcessor> WorkerPool<Proc> {
    /// Start `settings.workers` workers pulling from one bounded queue
    pub fn start_shared(
        settings: PoolSettings,
        processor: Arc<Proc>,
        metrics: &MetricsCollector,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let discarded = Arc::new(AtomicUsize::new(0));
        let queue: JobQueue<Proc> = BoundedFrameQueue::new(settings.queue_capacity);

        let workers = (0..settings.workers)
            .map(|index| {
                let worker = Worker::new(index, processor.clone(), metrics, &cancel, &discarded);
                tokio::spawn(worker.run_shared(queue.clone(), settings.dequeue_timeout))
            })
            .collect();

        info!(
            "Worker pool started: {} workers on a shared queue of {} frames",
            settings.workers, settings.queue_capacity
        );

        Self {
            settings,
            queue: Some(queue),
            accepting: Arc::new(AtomicBool::new(true)),
            cancel,
            discarded,
            submitted: Arc::new(AtomicUsize::new(0)),
            workers,
        }
    }

    /// Start one worker per assignment, each owning its frames outright
    pub fn start_static(
        settings: PoolSettings,
        processor: Arc<Proc>,
        assignments: Vec<Vec<FrameUnit<Proc::Input>>>,
        metrics: &MetricsCollector,
        parent: &CancellationToken,
    ) -> (Self, Vec<FrameHandle<Proc::Output>>) {
        let cancel = parent.child_token();
        let discarded = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(assignments.iter().map(Vec::len).sum());
        let mut workers = Vec::with_capacity(assignments.len());

        for (index, units) in assignments.into_iter().enumerate() {
            debug!("worker-{} assigned {} frame(s)", index, units.len());
            let jobs: Vec<_> = units
                .into_iter()
                .map(|unit| {
                    let (job, handle) = Job::new(unit);
                    handles.push(handle);
                    job
                })
                .collect();

            let worker = Worker::new(index, processor.clone(), metrics, &cancel, &discarded);
            workers.push(tokio::spawn(worker.run_static(jobs)));
        }

        info!("Worker pool started: {} workers on static ranges", workers.len());

        let pool = Self {
            settings,
            queue: None,
            accepting: Arc::new(AtomicBool::new(false)),
            cancel,
            discarded,
            submitted: Arc::new(AtomicUsize::new(handles.len())),
            workers,
        };
        (pool, handles)
    }

    pub fn submitter(&self) -> FrameSubmitter<Proc::Input, Proc::Output> {
        FrameSubmitter {
            queue: self.queue.clone(),
            accepting: self.accepting.clone(),
            submitted: self.submitted.clone(),
        }
    }

    pub async fn submit(
        &self,
        unit: FrameUnit<Proc::Input>,
    ) -> Result<FrameHandle<Proc::Output>, PipelineError> {
        self.submitter().submit(unit).await
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Frames handed to the pool so far, each with a `FrameHandle`
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Frames waiting in the shared queue (approximate)
    pub fn queued(&self) -> usize {
        self.queue.as_ref().map(|q| q.size()).unwrap_or(0)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Ask workers to stop between frames; queued frames will be discarded
    pub fn cancel(&self) {
        self.accepting.store(false, Ordering::Release);
        self.cancel.cancel();
    }

    /// Signal end of stream and wait until every worker has drained and exited
    pub async fn wait_idle(&mut self) {
        self.accepting.store(false, Ordering::Release);
        if let Some(queue) = &self.queue {
            queue.close();
        }

        while let Some(handle) = self.workers.last_mut() {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    warn!("Worker task panicked: {}", e);
                }
            }
            self.workers.pop();
        }
    }

    /// Stop accepting, give workers the grace period to finish what is queued,
    /// then cancel and finally abort whatever is still running.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        let grace = self.settings.shutdown_grace;
        let graceful = tokio::time::timeout(grace, self.wait_idle()).await.is_ok();

        let mut aborted_workers = 0;
        if !graceful {
            warn!("Workers still busy after {:?}, cancelling", grace);
            self.cancel.cancel();
            if tokio::time::timeout(CANCEL_SETTLE, self.wait_idle()).await.is_err() {
                for handle in self.workers.drain(..) {
                    handle.abort();
                    aborted_workers += 1;
                }
                warn!("Force-terminated {} worker(s)", aborted_workers);
            }
        }

        self.discard_queued().await;
        let discarded_units = self.discarded.load(Ordering::Relaxed);
        debug!(
            "Worker pool shut down (graceful={}, aborted={}, discarded={})",
            graceful, aborted_workers, discarded_units
        );

        ShutdownReport {
            graceful,
            aborted_workers,
            discarded_units,
        }
    }

    async fn discard_queued(&self) {
        let Some(queue) = &self.queue else {
            return;
        };

        let jobs = queue.drain().await;
        if !jobs.is_empty() {
            info!("Discarded {} queued frame(s)", jobs.len());
        }
        for job in jobs {
            job.discard(&self.discarded);
        }
    }
}

impl<Proc: FrameProcessor> Drop for WorkerPool<Proc> {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.cancel.cancel();
        for handle in &self.workers {
            handle.abort();
        }
    }
}

struct Worker<Proc: FrameProcessor> {
    processor: Arc<Proc>,
    metrics: Arc<WorkerMetrics>,
    cancel: CancellationToken,
    discarded: Arc<AtomicUsize>,
}

impl<Proc: FrameProcessor> Worker<Proc> {
    fn new(
        index: usize,
        processor: Arc<Proc>,
        collector: &MetricsCollector,
        cancel: &CancellationToken,
        discarded: &Arc<AtomicUsize>,
    ) -> Self {
        let metrics = Arc::new(WorkerMetrics::new(format!("worker-{}", index)));
        collector.register(metrics.clone());
        Self {
            processor,
            metrics,
            cancel: cancel.clone(),
            discarded: discarded.clone(),
        }
    }

    fn id(&self) -> &str {
        self.metrics.worker_id()
    }

    async fn run_shared(self, queue: JobQueue<Proc>, dequeue_timeout: Duration) {
        debug!("{} started", self.id());

        loop {
            if self.cancel.is_cancelled() {
                debug!("{} observed cancellation", self.id());
                break;
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => continue,
                next = queue.dequeue(dequeue_timeout) => next,
            };

            match next {
                Dequeued::Item(job) => self.execute(job).await,
                Dequeued::TimedOut => {
                    trace!("{} idle for {:?}", self.id(), dequeue_timeout);
                }
                Dequeued::Closed => break,
            }
        }

        debug!("{} exiting", self.id());
    }

    async fn run_static(self, jobs: Vec<Job<Proc::Input, Proc::Output>>) {
        debug!("{} started with {} frame(s)", self.id(), jobs.len());

        let mut pending = jobs.into_iter();
        for job in pending.by_ref() {
            if self.cancel.is_cancelled() {
                debug!("{} observed cancellation", self.id());
                job.discard(&self.discarded);
                break;
            }
            self.execute(job).await;
        }
        for job in pending {
            job.discard(&self.discarded);
        }

        debug!("{} exiting", self.id());
    }

    async fn execute(&self, job: Job<Proc::Input, Proc::Output>) {
        let Job { unit, slot } = job;
        let (meta, payload) = unit.into_parts();
        let sequence = meta.sequence;

        let start = self.metrics.start_processing();
        let result = AssertUnwindSafe(self.processor.process(payload))
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(Ok(output)) => {
                let elapsed = self.metrics.finish_processing(start);
                trace!("{} processed frame {} in {:?}", self.id(), sequence, elapsed);
                Ok(ProcessedFrameUnit::new(meta, output, elapsed))
            }
            Ok(Err(e)) => {
                self.metrics.record_error();
                warn!("{} failed frame {}: {:#}", self.id(), sequence, e);
                Err(UnitFailure::processing(sequence, &e))
            }
            Err(panic) => {
                self.metrics.record_error();
                let msg = panic_message(&*panic);
                warn!("{} panicked on frame {}: {}", self.id(), sequence, msg);
                Err(UnitFailure::new(sequence, FailureReason::Panicked(msg)))
            }
        };

        slot.complete(outcome);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
