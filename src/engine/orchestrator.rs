use futures::channel::mpsc;
use futures::future;
use log::{debug, error, info};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::collector::{Collected, ResultCollector};
use super::distributor::WorkDistributor;
use super::state::PipelineState;
use super::worker_pool::{FrameHandle, FrameSubmitter, PoolSettings, ShutdownReport, WorkerPool};
use crate::config::{DistributionMode, PipelineConfig};
use crate::core::{FrameDecoder, FrameEncoder, FrameProcessor, FrameUnit, SequenceCounter};
use crate::error::{PipelineError, RunFailure, UnitFailure};
use crate::observability::{MetricsCollector, MetricsSnapshot, PipelineMonitor, RunOutcome};

/// Summary of a successful run
#[derive(Debug)]
pub struct RunReport {
    /// Location returned by the encoder
    pub output: String,
    pub frames: u64,
    /// Frames left out under best-effort collection
    pub skipped: Vec<UnitFailure>,
    pub duration: Duration,
    pub metrics: HashMap<String, MetricsSnapshot>,
    pub shutdown: ShutdownReport,
}

impl RunReport {
    /// Run-level figures for `PipelineMonitor`
    pub fn outcome(&self) -> RunOutcome {
        RunOutcome {
            frames_written: self.frames,
            skipped: self.skipped.iter().map(|f| f.sequence).collect(),
            duration: self.duration,
            graceful_shutdown: self.shutdown.graceful,
            aborted_workers: self.shutdown.aborted_workers,
            discarded_units: self.shutdown.discarded_units,
        }
    }
}

/// Drives one decoder through the worker pool and into one encoder.
///
/// A run walks `Idle -> Ingesting -> Distributing -> Processing -> Collecting
/// -> Reassembling -> Done`. Any error moves it to `Failed`, which is final;
/// after `Done` the orchestrator can be `reset` for another run.
pub struct PipelineOrchestrator<Proc: FrameProcessor> {
    config: PipelineConfig,
    processor: Arc<Proc>,
    state: PipelineState,
    cancel: CancellationToken,
    metrics: MetricsCollector,
}

impl<Proc: FrameProcessor> PipelineOrchestrator<Proc> {
    pub fn new(config: PipelineConfig, processor: Proc) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            processor: Arc::new(processor),
            state: PipelineState::Idle,
            cancel: CancellationToken::new(),
            metrics: MetricsCollector::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get current pipeline state
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Transition to a new state with validation
    pub fn transition_to(&mut self, new_state: PipelineState) -> Result<(), PipelineError> {
        if !self.state.can_transition_to(&new_state) {
            return Err(PipelineError::InvalidTransition {
                from: self.state.name().to_string(),
                to: new_state.name().to_string(),
            });
        }
        info!("Pipeline: {} -> {}", self.state.name(), new_state.name());
        self.state = new_state;
        Ok(())
    }

    /// Token that cancels the current run when triggered
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn monitor(&self) -> PipelineMonitor {
        PipelineMonitor::new(self.metrics.clone()).with_state(self.state.name())
    }

    /// Return a finished orchestrator to `Idle` with fresh metrics and token
    pub fn reset(&mut self) -> Result<(), PipelineError> {
        self.transition_to(PipelineState::Idle)?;
        self.cancel = CancellationToken::new();
        self.metrics = MetricsCollector::new();
        Ok(())
    }

    /// Decode, process and re-encode every frame of `decoder` into `encoder`.
    ///
    /// The encoder only sees frames once all of them are collected, and is
    /// never finalized if the run fails.
    pub async fn run<D, E>(&mut self, decoder: D, mut encoder: E) -> Result<RunReport, RunFailure>
    where
        D: FrameDecoder<Payload = Proc::Input>,
        E: FrameEncoder<Payload = Proc::Output>,
    {
        if let Err(error) = self.transition_to(PipelineState::Ingesting) {
            return Err(RunFailure {
                stage: self.state.name().to_string(),
                error,
            });
        }

        let started = Instant::now();
        let result = match self.config.run_deadline() {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.execute(decoder, &mut encoder, started))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(PipelineError::DeadlineExceeded(deadline)),
                }
            }
            None => self.execute(decoder, &mut encoder, started).await,
        };

        result.map_err(|error| self.fail(error))
    }

    fn fail(&mut self, error: PipelineError) -> RunFailure {
        let stage = self.state.name().to_string();
        error!("Pipeline failed during {}: {}", stage, error);

        let failed = PipelineState::Failed {
            stage: stage.clone(),
            error_msg: error.to_string(),
        };
        debug_assert!(self.state.can_transition_to(&failed));
        self.state = failed;

        RunFailure { stage, error }
    }

    async fn execute<D, E>(
        &mut self,
        mut decoder: D,
        encoder: &mut E,
        started: Instant,
    ) -> Result<RunReport, PipelineError>
    where
        D: FrameDecoder<Payload = Proc::Input>,
        E: FrameEncoder<Payload = Proc::Output>,
    {
        let (collected, shutdown) = match self.config.distribution {
            DistributionMode::Static => self.process_static(&mut decoder).await?,
            DistributionMode::Shared => self.process_shared(&mut decoder).await?,
        };
        drop(decoder);

        self.transition_to(PipelineState::Reassembling {
            frames: collected.len(),
        })?;
        let total_frames = collected.len() as u64;
        for frame in collected.frames {
            let sequence = frame.sequence();
            encoder
                .append_frame(frame.into_result())
                .await
                .map_err(|source| PipelineError::EncodeRejection { sequence, source })?;
        }
        let output = encoder
            .finalize()
            .await
            .map_err(PipelineError::FinalizeRejection)?;

        let duration = started.elapsed();
        self.transition_to(PipelineState::Done {
            duration: Some(duration),
            total_frames,
        })?;
        info!(
            "Pipeline finished: {} frame(s) written to {} in {:?}",
            total_frames, output, duration
        );

        Ok(RunReport {
            output,
            frames: total_frames,
            skipped: collected.skipped,
            duration,
            metrics: self.metrics.snapshot(),
            shutdown,
        })
    }

    /// Read the whole stream, split it into contiguous ranges, and run one
    /// worker per range.
    async fn process_static<D>(&mut self, decoder: &mut D) -> Result<Drained<Proc>, PipelineError>
    where
        D: FrameDecoder<Payload = Proc::Input>,
    {
        let sequences = SequenceCounter::new();
        let mut units = Vec::new();
        while let Some(payload) = read_frame(decoder, &self.cancel).await? {
            units.push(FrameUnit::new(sequences.next(), payload));
        }
        if self.cancel.is_cancelled() {
            return Err(self.cancelled(units.len()));
        }
        debug!("Ingested {} frame(s)", units.len());

        let distributor = WorkDistributor::new(self.config.workers);
        let assignments = distributor.partition(units)?;

        self.transition_to(PipelineState::Distributing {
            workers: distributor.workers(),
        })?;
        let (mut pool, handles) = WorkerPool::start_static(
            PoolSettings::from_config(&self.config),
            self.processor.clone(),
            assignments,
            &self.metrics,
            &self.cancel,
        );

        let collector = ResultCollector::from_config(&self.config);
        self.drive(&mut pool, future::ready(Ok(())), collector.collect(handles))
            .await
    }

    /// Start the pool as soon as the first frame is read and keep decoding
    /// into the shared queue while workers process.
    async fn process_shared<D>(&mut self, decoder: &mut D) -> Result<Drained<Proc>, PipelineError>
    where
        D: FrameDecoder<Payload = Proc::Input>,
    {
        let first = match read_frame(decoder, &self.cancel).await? {
            Some(payload) => payload,
            None if self.cancel.is_cancelled() => return Err(self.cancelled(0)),
            None => return Err(PipelineError::EmptyInput),
        };

        let settings = PoolSettings::from_config(&self.config);
        self.transition_to(PipelineState::Distributing {
            workers: settings.workers,
        })?;
        let mut pool = WorkerPool::start_shared(
            settings,
            self.processor.clone(),
            &self.metrics,
            &self.cancel,
        );

        let (handle_tx, handle_rx) = mpsc::unbounded();
        let feeding = feed(decoder, pool.submitter(), first, handle_tx, self.cancel.clone());
        let collector = ResultCollector::from_config(&self.config);
        self.drive(&mut pool, feeding, collector.collect_stream(handle_rx))
            .await
    }

    /// Run the pool to completion while results are collected as they land.
    ///
    /// `feeding` resolves once every frame is submitted; the pool then drains
    /// with no limit beyond the collect timeout and the run deadline.
    /// Collection ending first (fail-fast failure, collect timeout, or every
    /// frame resolved) cancels the pool before `shutdown`, so the grace period
    /// only ever applies to workers that were told to stop.
    async fn drive<F, C>(
        &mut self,
        pool: &mut WorkerPool<Proc>,
        feeding: F,
        collecting: C,
    ) -> Result<Drained<Proc>, PipelineError>
    where
        F: Future<Output = Result<(), PipelineError>>,
        C: Future<Output = Result<Collected<Proc::Output>, PipelineError>>,
    {
        let cancel = self.cancel.clone();
        tokio::pin!(collecting);

        let mut early = match race(&cancel, collecting.as_mut(), feeding).await {
            Step::Cancelled => return Err(self.abandon(pool).await),
            Step::Done(Err(e)) => {
                pool.cancel();
                pool.shutdown().await;
                return Err(e);
            }
            Step::Done(Ok(())) => None,
            Step::Collected(collected) => Some(collected),
        };

        self.transition_to(PipelineState::Processing {
            started_at: Some(Instant::now()),
        })?;
        if early.is_none() {
            early = match race(&cancel, collecting.as_mut(), pool.wait_idle()).await {
                Step::Cancelled => return Err(self.abandon(pool).await),
                Step::Done(()) => None,
                Step::Collected(collected) => Some(collected),
            };
        }

        self.transition_to(PipelineState::Collecting {
            expected: pool.submitted(),
        })?;
        let collected = match early {
            Some(collected) => {
                debug!("Collection ended before the pool drained, stopping workers");
                pool.cancel();
                collected
            }
            None => self.until_cancelled(collecting.as_mut()).await?,
        };

        let shutdown = pool.shutdown().await;
        Ok((collected?, shutdown))
    }

    /// Shut down a pool whose run was cancelled
    async fn abandon(&self, pool: &mut WorkerPool<Proc>) -> PipelineError {
        let report = pool.shutdown().await;
        self.cancelled(report.discarded_units)
    }

    async fn until_cancelled<F: Future>(&self, fut: F) -> Result<F::Output, PipelineError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled(0)),
            output = fut => Ok(output),
        }
    }

    fn cancelled(&self, discarded: usize) -> PipelineError {
        PipelineError::Cancelled {
            completed: self.metrics.total_processed(),
            discarded,
        }
    }
}

type Drained<Proc> = (Collected<<Proc as FrameProcessor>::Output>, ShutdownReport);

enum Step<R, T> {
    Cancelled,
    Collected(Result<Collected<R>, PipelineError>),
    Done(T),
}

/// Poll `step` until it finishes, unless the run is cancelled or collection
/// ends first
async fn race<R, C, T>(
    cancel: &CancellationToken,
    collecting: Pin<&mut C>,
    step: impl Future<Output = T>,
) -> Step<R, T>
where
    C: Future<Output = Result<Collected<R>, PipelineError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Step::Cancelled,
        collected = collecting => Step::Collected(collected),
        output = step => Step::Done(output),
    }
}

/// Decode and submit frames until end of stream or cancellation, passing each
/// frame's handle on to the collector
async fn feed<D, R>(
    decoder: &mut D,
    submitter: FrameSubmitter<D::Payload, R>,
    first: D::Payload,
    handles: mpsc::UnboundedSender<FrameHandle<R>>,
    cancel: CancellationToken,
) -> Result<(), PipelineError>
where
    D: FrameDecoder,
    R: Send,
{
    let sequences = SequenceCounter::new();
    let mut next = Some(first);

    loop {
        let payload = match next.take() {
            Some(payload) => payload,
            None => match read_frame(decoder, &cancel).await? {
                Some(payload) => payload,
                None => break,
            },
        };
        let unit = FrameUnit::new(sequences.next(), payload);

        // A full queue must not hold off cancellation
        let handle = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            handle = submitter.submit(unit) => handle?,
        };
        if handles.unbounded_send(handle).is_err() {
            // collector already finished
            break;
        }
    }

    debug!("Queued {} frame(s)", sequences.issued());
    Ok(())
}

/// Next payload, or `None` at end of stream or once the run is cancelled
async fn read_frame<D: FrameDecoder>(
    decoder: &mut D,
    cancel: &CancellationToken,
) -> Result<Option<D::Payload>, PipelineError> {
    if cancel.is_cancelled() {
        return Ok(None);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(None),
        frame = decoder.next_frame() => frame.map_err(PipelineError::Decode),
    }
}
