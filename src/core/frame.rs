use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique frame identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(u64);

impl FrameId {
    fn next() -> Self {
        Self(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Hands out gap-free sequence numbers in ingestion order, starting at 0.
///
/// Owned by the ingestion stage of a single run.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of sequence numbers issued so far
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

/// Identity of a frame, carried unchanged from ingestion to reassembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMeta {
    pub id: FrameId,

    /// Position in the original stream; the only reordering key
    pub sequence: u64,

    pub captured_at: SystemTime,

    /// False until a worker produced a result for this frame
    pub processed: bool,
}

/// One unit of work: a raw frame payload plus its stream position
#[derive(Debug)]
pub struct FrameUnit<P> {
    meta: FrameMeta,
    payload: P,
}

impl<P> FrameUnit<P> {
    pub fn new(sequence: u64, payload: P) -> Self {
        Self {
            meta: FrameMeta {
                id: FrameId::next(),
                sequence,
                captured_at: SystemTime::now(),
                processed: false,
            },
            payload,
        }
    }

    pub fn id(&self) -> FrameId {
        self.meta.id
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    pub fn captured_at(&self) -> SystemTime {
        self.meta.captured_at
    }

    pub fn is_processed(&self) -> bool {
        self.meta.processed
    }

    pub fn meta(&self) -> &FrameMeta {
        &self.meta
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Split into metadata and the owned payload
    pub fn into_parts(self) -> (FrameMeta, P) {
        (self.meta, self.payload)
    }
}

/// Result of processing one `FrameUnit`
#[derive(Debug)]
pub struct ProcessedFrameUnit<R> {
    meta: FrameMeta,
    result: R,
    processing_duration: Duration,
}

impl<R> ProcessedFrameUnit<R> {
    pub fn new(mut meta: FrameMeta, result: R, processing_duration: Duration) -> Self {
        meta.processed = true;
        Self {
            meta,
            result,
            processing_duration,
        }
    }

    pub fn id(&self) -> FrameId {
        self.meta.id
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    pub fn captured_at(&self) -> SystemTime {
        self.meta.captured_at
    }

    pub fn is_processed(&self) -> bool {
        self.meta.processed
    }

    pub fn result(&self) -> &R {
        &self.result
    }

    pub fn into_result(self) -> R {
        self.result
    }

    pub fn processing_duration(&self) -> Duration {
        self.processing_duration
    }

    pub fn processing_duration_ms(&self) -> u64 {
        self.processing_duration.as_millis() as u64
    }
}

impl<R> fmt::Display for ProcessedFrameUnit<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProcessedFrame[id={}, seq={}, time={}ms]",
            self.meta.id,
            self.meta.sequence,
            self.processing_duration_ms()
        )
    }
}
