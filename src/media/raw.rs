//! Headerless packed RGB24 video files: frames stored back to back

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::debug;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};

use super::{FrameGeometry, FramePool, PooledFrame};
use crate::core::{FrameDecoder, FrameEncoder};

/// Buffers kept for reuse beyond those in flight
const POOL_IDLE_FRAMES: usize = 64;

pub struct RawVideoDecoder<R = BufReader<File>> {
    reader: R,
    geometry: FrameGeometry,
    pool: FramePool,
    frames_read: u64,
}

impl RawVideoDecoder {
    pub async fn open(path: impl AsRef<Path>, geometry: FrameGeometry) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .with_context(|| format!("Failed to open input {}", path.display()))?;
        debug!("Reading {}x{} frames from {}", geometry.width, geometry.height, path.display());
        Ok(Self::from_reader(BufReader::new(file), geometry))
    }
}

impl<R: AsyncRead + Unpin + Send> RawVideoDecoder<R> {
    pub fn from_reader(reader: R, geometry: FrameGeometry) -> Self {
        Self {
            reader,
            geometry,
            pool: FramePool::new(geometry.frame_size(), POOL_IDLE_FRAMES),
            frames_read: 0,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn pool(&self) -> &FramePool {
        &self.pool
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> FrameDecoder for RawVideoDecoder<R> {
    type Payload = PooledFrame;

    async fn next_frame(&mut self) -> Result<Option<PooledFrame>> {
        let size = self.geometry.frame_size();
        let mut frame = self.pool.get();
        frame.resize(size, 0);

        let mut filled = 0;
        while filled < size {
            let n = self.reader.read(&mut frame[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < size {
            bail!(
                "Truncated frame {}: got {} of {} bytes",
                self.frames_read,
                filled,
                size
            );
        }

        self.frames_read += 1;
        Ok(Some(frame))
    }
}

/// Writes frames to a file, created on the first frame
pub struct RawVideoEncoder<T> {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    frame_size: Option<usize>,
    frames_written: u64,
    _payload: PhantomData<fn(T)>,
}

impl<T> RawVideoEncoder<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            frame_size: None,
            frames_written: 0,
            _payload: PhantomData,
        }
    }

    /// Reject frames that are not exactly `geometry.frame_size()` bytes
    pub fn with_geometry(mut self, geometry: FrameGeometry) -> Self {
        self.frame_size = Some(geometry.frame_size());
        self
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    async fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = File::create(&self.path)
                .await
                .with_context(|| format!("Failed to create output {}", self.path.display()))?;
            self.writer = Some(BufWriter::new(file));
        }

        match self.writer.as_mut() {
            Some(writer) => Ok(writer),
            None => bail!("Output {} is not open", self.path.display()),
        }
    }
}

#[async_trait]
impl<T: AsRef<[u8]> + Send + 'static> FrameEncoder for RawVideoEncoder<T> {
    type Payload = T;

    async fn append_frame(&mut self, payload: T) -> Result<()> {
        let bytes = payload.as_ref();
        if let Some(expected) = self.frame_size {
            if bytes.len() != expected {
                bail!("Frame has {} bytes, expected {}", bytes.len(), expected);
            }
        }

        self.writer().await?.write_all(bytes).await?;
        self.frames_written += 1;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<String> {
        let writer = self.writer().await?;
        writer.flush().await?;
        writer.get_mut().sync_all().await?;

        debug!("Wrote {} frame(s) to {}", self.frames_written, self.path.display());
        Ok(self.path.display().to_string())
    }
}
