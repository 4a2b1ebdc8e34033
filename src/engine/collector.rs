use futures::stream::{self, FuturesUnordered, Stream, StreamExt};
use futures::FutureExt;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;

use super::reorder::ReorderBuffer;
use super::worker_pool::{FrameHandle, UnitOutcome};
use crate::config::{CollectionPolicy, PipelineConfig};
use crate::core::ProcessedFrameUnit;
use crate::error::{FailureReason, PipelineError, UnitFailure};

/// Frames gathered from one run, ascending by sequence number
#[derive(Debug)]
pub struct Collected<R> {
    pub frames: Vec<ProcessedFrameUnit<R>>,
    /// Units dropped under best-effort collection, ascending by sequence number
    pub skipped: Vec<UnitFailure>,
}

impl<R> Collected<R> {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Waits on every frame handle of a run and puts the results back in order
#[derive(Debug, Clone)]
pub struct ResultCollector {
    policy: CollectionPolicy,
    timeout: Duration,
}

struct Progress<R> {
    reorder: ReorderBuffer<ProcessedFrameUnit<R>>,
    frames: Vec<ProcessedFrameUnit<R>>,
    failures: Vec<UnitFailure>,
    outstanding: BTreeSet<u64>,
    received: usize,
}

impl<R> Progress<R> {
    fn starting_at(first: u64) -> Self {
        Self {
            reorder: ReorderBuffer::starting_at(first),
            frames: Vec::new(),
            failures: Vec::new(),
            outstanding: BTreeSet::new(),
            received: 0,
        }
    }

    fn track(&mut self, sequence: u64) {
        self.received += 1;
        self.outstanding.insert(sequence);
    }

    fn record(&mut self, outcome: UnitOutcome<R>) {
        match outcome {
            Ok(frame) => {
                let sequence = frame.sequence();
                self.outstanding.remove(&sequence);
                self.reorder.insert(sequence, frame);
            }
            Err(failure) => {
                warn!("Frame {} failed: {}", failure.sequence, failure.reason);
                self.outstanding.remove(&failure.sequence);
                self.reorder.skip(failure.sequence);
                self.failures.push(failure);
            }
        }
        self.frames.extend(self.reorder.drain_ready());
    }

    fn time_out_outstanding(&mut self) {
        for sequence in std::mem::take(&mut self.outstanding) {
            self.reorder.skip(sequence);
            self.failures
                .push(UnitFailure::new(sequence, FailureReason::TimedOut));
        }
        self.frames.extend(self.reorder.drain_ready());
    }
}

enum Event<R> {
    Submitted(Option<FrameHandle<R>>),
    Resolved(UnitOutcome<R>),
    TimedOut,
}

impl ResultCollector {
    pub fn new(policy: CollectionPolicy, timeout: Duration) -> Self {
        Self { policy, timeout }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.collection, config.collect_timeout())
    }

    pub fn policy(&self) -> CollectionPolicy {
        self.policy
    }

    /// Await all handles (which must cover a contiguous run of sequence
    /// numbers) under one overall timeout.
    pub async fn collect<R>(
        &self,
        mut handles: Vec<FrameHandle<R>>,
    ) -> Result<Collected<R>, PipelineError> {
        handles.sort_by_key(FrameHandle::sequence);
        self.collect_stream(stream::iter(handles)).await
    }

    /// Collect handles as they are submitted, ascending by sequence, until
    /// the stream ends and every handle has resolved.
    ///
    /// The timeout starts on the first poll, so it bounds processing as well
    /// as collection when this runs alongside the workers.
    pub async fn collect_stream<R, S>(&self, handles: S) -> Result<Collected<R>, PipelineError>
    where
        S: Stream<Item = FrameHandle<R>> + Unpin,
    {
        let deadline = Instant::now() + self.timeout;
        let mut handles = handles.fuse();

        let first = match tokio::time::timeout_at(deadline, handles.next()).await {
            Ok(Some(handle)) => handle,
            Ok(None) => return Err(PipelineError::EmptyInput),
            Err(_) => {
                warn!("Collection timed out after {:?} before any frame arrived", self.timeout);
                return Err(PipelineError::Collection {
                    failures: Vec::new(),
                    unresolved: Vec::new(),
                });
            }
        };

        debug!("Collecting from frame {}, policy {:?}", first.sequence(), self.policy);
        let mut progress = Progress::starting_at(first.sequence());
        progress.track(first.sequence());
        let mut pending = FuturesUnordered::new();
        pending.push(first.wait());
        let mut submitting = true;

        loop {
            if !submitting && pending.is_empty() {
                break;
            }

            let event = tokio::select! {
                biased;
                handle = handles.next(), if submitting => Event::Submitted(handle),
                Some(outcome) = pending.next(), if !pending.is_empty() => Event::Resolved(outcome),
                _ = tokio::time::sleep_until(deadline) => Event::TimedOut,
            };

            match event {
                Event::Submitted(Some(handle)) => {
                    progress.track(handle.sequence());
                    pending.push(handle.wait());
                }
                Event::Submitted(None) => submitting = false,
                Event::Resolved(outcome) => {
                    progress.record(outcome);
                    if self.policy == CollectionPolicy::FailFast && !progress.failures.is_empty() {
                        // Fold in whatever already finished so the error is complete
                        while let Some(Some(outcome)) = pending.next().now_or_never() {
                            progress.record(outcome);
                        }
                        break;
                    }
                }
                Event::TimedOut => {
                    while let Some(Some(handle)) = handles.next().now_or_never() {
                        progress.track(handle.sequence());
                    }
                    warn!(
                        "Collection timed out after {:?} with {} frame(s) unresolved",
                        self.timeout,
                        progress.outstanding.len()
                    );
                    progress.time_out_outstanding();
                    break;
                }
            }
        }

        let Progress {
            mut frames,
            mut failures,
            outstanding,
            mut reorder,
            received,
        } = progress;
        failures.sort_by_key(|f| f.sequence);

        match self.policy {
            CollectionPolicy::FailFast if !failures.is_empty() => Err(PipelineError::Collection {
                failures,
                unresolved: outstanding.into_iter().collect(),
            }),
            _ if frames.is_empty() => Err(PipelineError::Collection {
                failures,
                unresolved: outstanding.into_iter().collect(),
            }),
            _ => {
                frames.extend(reorder.drain_ready());
                debug_assert!(frames.windows(2).all(|w| w[0].sequence() < w[1].sequence()));
                info!(
                    "Collected {} of {} frame(s), {} skipped",
                    frames.len(),
                    received,
                    failures.len()
                );
                Ok(Collected {
                    frames,
                    skipped: failures,
                })
            }
        }
    }
}
