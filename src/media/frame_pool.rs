use std::fmt;
use std::sync::{Arc, Mutex};

type FreeList = Arc<Mutex<Vec<Vec<u8>>>>;

/// Recycles frame-sized byte buffers between decoder and encoder.
///
/// Buffers come back when the `PooledFrame` holding them is dropped; at most
/// `max_idle` are kept, the rest are freed.
#[derive(Clone)]
pub struct FramePool {
    free: FreeList,
    frame_size: usize,
    max_idle: usize,
}

impl FramePool {
    pub fn new(frame_size: usize, max_idle: usize) -> Self {
        Self {
            free: Arc::new(Mutex::new(Vec::new())),
            frame_size,
            max_idle,
        }
    }

    /// An empty buffer with room for one frame
    pub fn get(&self) -> PooledFrame {
        let buffer = self
            .free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.frame_size));

        PooledFrame {
            buffer,
            pool: self.free.clone(),
            max_idle: self.max_idle,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Buffers waiting to be reused
    pub fn idle(&self) -> usize {
        self.free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

pub struct PooledFrame {
    buffer: Vec<u8>,
    pool: FreeList,
    max_idle: usize,
}

impl PooledFrame {
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }
}

impl Drop for PooledFrame {
    fn drop(&mut self) {
        let mut buffer = std::mem::take(&mut self.buffer);
        if buffer.capacity() == 0 {
            return;
        }
        buffer.clear();

        let mut free = self
            .pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if free.len() < self.max_idle {
            free.push(buffer);
        }
    }
}

impl std::ops::Deref for PooledFrame {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl std::ops::DerefMut for PooledFrame {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl AsRef<[u8]> for PooledFrame {
    fn as_ref(&self) -> &[u8] {
        &self.buffer
    }
}

impl fmt::Debug for PooledFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledFrame")
            .field("len", &self.buffer.len())
            .finish()
    }
}
