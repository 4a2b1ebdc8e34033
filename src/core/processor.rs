use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

/// Per-frame processing function run by the worker pool
///
/// Implementations must only read the payload they are given. They may be
/// slow; CPU-heavy work belongs on the blocking pool (see [`blocking_processor`]).
/// An `Err` (or a panic) fails that one frame, never the worker.
#[async_trait]
pub trait FrameProcessor: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    async fn process(&self, input: Self::Input) -> Result<Self::Output>;
}

/// Closure run inline on the worker task
pub struct FnProcessor<F, I, O> {
    f: F,
    _types: PhantomData<fn(I) -> O>,
}

/// Wrap a cheap closure as a [`FrameProcessor`]
pub fn fn_processor<F, I, O>(f: F) -> FnProcessor<F, I, O>
where
    F: Fn(I) -> Result<O> + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    FnProcessor {
        f,
        _types: PhantomData,
    }
}

#[async_trait]
impl<F, I, O> FrameProcessor for FnProcessor<F, I, O>
where
    F: Fn(I) -> Result<O> + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    type Input = I;
    type Output = O;

    async fn process(&self, input: I) -> Result<O> {
        (self.f)(input)
    }
}

/// Closure run on tokio's blocking pool, for CPU-bound work
pub struct BlockingProcessor<F, I, O> {
    f: Arc<F>,
    _types: PhantomData<fn(I) -> O>,
}

/// Wrap a CPU-bound closure as a [`FrameProcessor`]
pub fn blocking_processor<F, I, O>(f: F) -> BlockingProcessor<F, I, O>
where
    F: Fn(I) -> Result<O> + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    BlockingProcessor {
        f: Arc::new(f),
        _types: PhantomData,
    }
}

#[async_trait]
impl<F, I, O> FrameProcessor for BlockingProcessor<F, I, O>
where
    F: Fn(I) -> Result<O> + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    type Input = I;
    type Output = O;

    async fn process(&self, input: I) -> Result<O> {
        let f = self.f.clone();
        run_blocking(move || f(input)).await
    }
}

/// Run `f` on tokio's blocking pool; a panic in `f` resumes on the caller
pub async fn run_blocking<F, O>(f: F) -> Result<O>
where
    F: FnOnce() -> Result<O> + Send + 'static,
    O: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(anyhow!("Blocking processor task failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_processor() {
        let double = fn_processor(|x: u32| Ok(x * 2));
        assert_eq!(double.process(21).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_blocking_processor_propagates_error() {
        let failing = blocking_processor(|x: u32| -> Result<u32> {
            if x == 0 {
                anyhow::bail!("zero is not allowed")
            }
            Ok(x)
        });
        assert_eq!(failing.process(3).await.unwrap(), 3);
        let err = failing.process(0).await.unwrap_err();
        assert!(err.to_string().contains("zero"));
    }
}
