pub mod codec;
pub mod frame;
pub mod processor;

pub use codec::{FrameDecoder, FrameEncoder};
pub use frame::{FrameId, FrameMeta, FrameUnit, ProcessedFrameUnit, SequenceCounter};
pub use processor::{
    blocking_processor, fn_processor, run_blocking, BlockingProcessor, FnProcessor, FrameProcessor,
};
