use anyhow::Result;
use async_trait::async_trait;

/// Source of raw frames (demux + decode side)
#[async_trait]
pub trait FrameDecoder: Send {
    type Payload: Send + 'static;

    /// Next raw frame, or `None` once the stream has ended
    async fn next_frame(&mut self) -> Result<Option<Self::Payload>>;
}

/// Sink for processed frames (encode + mux side)
#[async_trait]
pub trait FrameEncoder: Send {
    type Payload: Send + 'static;

    /// Called once per frame, in sequence order
    async fn append_frame(&mut self, payload: Self::Payload) -> Result<()>;

    /// Complete the output and return where it was written
    async fn finalize(&mut self) -> Result<String>;
}
