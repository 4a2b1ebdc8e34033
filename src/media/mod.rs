//! Concrete frame sources, sinks and processors

pub mod border;
pub mod frame_pool;
pub mod memory;
pub mod raw;

use serde::{Deserialize, Serialize};

pub use border::{
    border_average, AnalyzedFrame, BorderColorProcessor, BorderSummary, BorderTrackingEncoder, Rgb,
};
pub use frame_pool::{FramePool, PooledFrame};
pub use memory::{MemoryDecoder, MemoryEncoder};
pub use raw::{RawVideoDecoder, RawVideoEncoder};

/// Dimensions of a packed RGB24 frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: usize,
    pub height: usize,
}

impl FrameGeometry {
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Bytes in one frame
    pub fn frame_size(&self) -> usize {
        self.width * self.height * Self::BYTES_PER_PIXEL
    }
}
