use anyhow::{bail, Result};
use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use super::FrameGeometry;
use crate::core::{run_blocking, FrameEncoder, FrameProcessor};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A frame's pixels, untouched, together with its border colour
#[derive(Debug)]
pub struct AnalyzedFrame<T> {
    pub pixels: T,
    pub border: Rgb,
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for AnalyzedFrame<T> {
    fn as_ref(&self) -> &[u8] {
        self.pixels.as_ref()
    }
}

/// Average colour of the outermost ring of pixels; each pixel counts once.
///
/// Channels are averaged independently and truncated.
pub fn border_average(pixels: &[u8], geometry: FrameGeometry) -> Result<Rgb> {
    let FrameGeometry { width, height } = geometry;
    if width == 0 || height == 0 {
        bail!("Frame geometry {}x{} has no pixels", width, height);
    }
    if pixels.len() != geometry.frame_size() {
        bail!(
            "Expected {} bytes for a {}x{} frame, got {}",
            geometry.frame_size(),
            width,
            height,
            pixels.len()
        );
    }

    let mut sum = [0u64; 3];
    let mut count = 0u64;
    let mut add = |x: usize, y: usize| {
        let offset = (y * width + x) * FrameGeometry::BYTES_PER_PIXEL;
        for (channel, total) in sum.iter_mut().enumerate() {
            *total += u64::from(pixels[offset + channel]);
        }
        count += 1;
    };

    for y in 0..height {
        if y == 0 || y == height - 1 {
            (0..width).for_each(|x| add(x, y));
        } else {
            add(0, y);
            if width > 1 {
                add(width - 1, y);
            }
        }
    }

    Ok(Rgb {
        r: (sum[0] / count) as u8,
        g: (sum[1] / count) as u8,
        b: (sum[2] / count) as u8,
    })
}

/// Computes each frame's border colour on the blocking pool
pub struct BorderColorProcessor<T> {
    geometry: FrameGeometry,
    _payload: PhantomData<fn(T) -> T>,
}

impl<T> BorderColorProcessor<T> {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            geometry,
            _payload: PhantomData,
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }
}

#[async_trait]
impl<T: AsRef<[u8]> + Send + 'static> FrameProcessor for BorderColorProcessor<T> {
    type Input = T;
    type Output = AnalyzedFrame<T>;

    async fn process(&self, input: T) -> Result<AnalyzedFrame<T>> {
        let geometry = self.geometry;
        run_blocking(move || {
            let border = border_average(input.as_ref(), geometry)?;
            Ok(AnalyzedFrame {
                pixels: input,
                border,
            })
        })
        .await
    }
}

#[derive(Debug, Default)]
struct Tally {
    frames: u64,
    sum: [u64; 3],
}

/// Running mean of the border colours written so far; clones share it
#[derive(Debug, Clone, Default)]
pub struct BorderSummary {
    tally: Arc<Mutex<Tally>>,
}

impl BorderSummary {
    pub fn frames(&self) -> u64 {
        self.lock().frames
    }

    /// Mean border colour over every recorded frame, truncated per channel
    pub fn mean(&self) -> Option<Rgb> {
        let tally = self.lock();
        if tally.frames == 0 {
            return None;
        }
        Some(Rgb {
            r: (tally.sum[0] / tally.frames) as u8,
            g: (tally.sum[1] / tally.frames) as u8,
            b: (tally.sum[2] / tally.frames) as u8,
        })
    }

    /// Add one frame's border; returns its index in the output
    fn record(&self, rgb: Rgb) -> u64 {
        let mut tally = self.lock();
        for (total, channel) in tally.sum.iter_mut().zip([rgb.r, rgb.g, rgb.b]) {
            *total += u64::from(channel);
        }
        tally.frames += 1;
        tally.frames - 1
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tally> {
        self.tally
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Hands analyzed frames on to `inner`, logging each border colour
pub struct BorderTrackingEncoder<E> {
    inner: E,
    summary: BorderSummary,
}

impl<E> BorderTrackingEncoder<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            summary: BorderSummary::default(),
        }
    }

    /// Shared view of the tally, still readable after the encoder is consumed
    pub fn summary(&self) -> BorderSummary {
        self.summary.clone()
    }
}

#[async_trait]
impl<T, E> FrameEncoder for BorderTrackingEncoder<E>
where
    T: Send + 'static,
    E: FrameEncoder<Payload = AnalyzedFrame<T>>,
{
    type Payload = AnalyzedFrame<T>;

    async fn append_frame(&mut self, frame: AnalyzedFrame<T>) -> Result<()> {
        let border = frame.border;
        self.inner.append_frame(frame).await?;
        let index = self.summary.record(border);
        debug!("Output frame {} border {}", index, border);
        Ok(())
    }

    async fn finalize(&mut self) -> Result<String> {
        self.inner.finalize().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(geometry: FrameGeometry, rgb: [u8; 3]) -> Vec<u8> {
        rgb.iter()
            .copied()
            .cycle()
            .take(geometry.frame_size())
            .collect()
    }

    #[test]
    fn test_solid_frame() {
        let geometry = FrameGeometry::new(5, 4);
        let pixels = solid(geometry, [10, 20, 30]);
        let rgb = border_average(&pixels, geometry).unwrap();
        assert_eq!(rgb, Rgb { r: 10, g: 20, b: 30 });
    }

    #[test]
    fn test_interior_is_ignored() {
        let geometry = FrameGeometry::new(3, 3);
        let mut pixels = solid(geometry, [100, 100, 100]);
        // centre pixel
        pixels[12..15].copy_from_slice(&[255, 0, 0]);
        let rgb = border_average(&pixels, geometry).unwrap();
        assert_eq!(rgb, Rgb { r: 100, g: 100, b: 100 });
    }

    #[test]
    fn test_corners_counted_once() {
        // 2x2: every pixel is a border pixel, each must weigh 1/4
        let geometry = FrameGeometry::new(2, 2);
        let pixels = vec![40, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(border_average(&pixels, geometry).unwrap().r, 10);
    }

    #[test]
    fn test_single_row() {
        let geometry = FrameGeometry::new(3, 1);
        let pixels = vec![30, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(border_average(&pixels, geometry).unwrap().r, 10);
    }

    #[test]
    fn test_wrong_size_rejected() {
        let geometry = FrameGeometry::new(4, 4);
        assert!(border_average(&[0u8; 10], geometry).is_err());
    }

    #[tokio::test]
    async fn test_processor_passes_pixels_through() {
        let geometry = FrameGeometry::new(4, 2);
        let pixels = solid(geometry, [1, 2, 3]);
        let processor = BorderColorProcessor::new(geometry);

        let analyzed = processor.process(pixels.clone()).await.unwrap();
        assert_eq!(analyzed.pixels, pixels);
        assert_eq!(analyzed.border.to_string(), "#010203");
    }

    #[test]
    fn test_summary_mean_truncates() {
        let summary = BorderSummary::default();
        assert_eq!(summary.mean(), None);

        summary.record(Rgb { r: 10, g: 0, b: 255 });
        summary.record(Rgb { r: 11, g: 1, b: 0 });
        assert_eq!(summary.frames(), 2);
        assert_eq!(summary.mean(), Some(Rgb { r: 10, g: 0, b: 127 }));
    }
}
