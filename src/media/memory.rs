//! In-memory frame source and sink

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::core::{FrameDecoder, FrameEncoder};

/// Yields a fixed list of payloads in order
pub struct MemoryDecoder<P> {
    frames: VecDeque<P>,
}

impl<P> MemoryDecoder<P> {
    pub fn new(frames: impl IntoIterator<Item = P>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl<P: Send + 'static> FrameDecoder for MemoryDecoder<P> {
    type Payload = P;

    async fn next_frame(&mut self) -> Result<Option<P>> {
        Ok(self.frames.pop_front())
    }
}

#[derive(Debug)]
struct Recording<P> {
    frames: Vec<P>,
    finalized: bool,
}

/// Records appended payloads. Clones share the recording, so a test can keep
/// one to inspect after handing the other to a pipeline.
pub struct MemoryEncoder<P> {
    name: String,
    recording: Arc<Mutex<Recording<P>>>,
    reject_at: Option<usize>,
}

impl<P> MemoryEncoder<P> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            recording: Arc::new(Mutex::new(Recording {
                frames: Vec::new(),
                finalized: false,
            })),
            reject_at: None,
        }
    }

    /// Fail the append of the `index`-th frame (0-based)
    pub fn reject_at(mut self, index: usize) -> Self {
        self.reject_at = Some(index);
        self
    }

    fn with_recording<T>(&self, f: impl FnOnce(&mut Recording<P>) -> T) -> T {
        let mut recording = self
            .recording
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut recording)
    }

    pub fn len(&self) -> usize {
        self.with_recording(|r| r.frames.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finalized(&self) -> bool {
        self.with_recording(|r| r.finalized)
    }

    /// Take the recorded payloads out
    pub fn take_frames(&self) -> Vec<P> {
        self.with_recording(|r| std::mem::take(&mut r.frames))
    }
}

impl<P> Clone for MemoryEncoder<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            recording: self.recording.clone(),
            reject_at: self.reject_at,
        }
    }
}

#[async_trait]
impl<P: Send + 'static> FrameEncoder for MemoryEncoder<P> {
    type Payload = P;

    async fn append_frame(&mut self, payload: P) -> Result<()> {
        let reject_at = self.reject_at;
        self.with_recording(|r| {
            if r.finalized {
                bail!("Output {} is already finalized", self.name);
            }
            if reject_at == Some(r.frames.len()) {
                bail!("Output {} rejected frame {}", self.name, r.frames.len());
            }
            r.frames.push(payload);
            Ok(())
        })
    }

    async fn finalize(&mut self) -> Result<String> {
        self.with_recording(|r| r.finalized = true);
        Ok(format!("memory://{}", self.name))
    }
}
