//! Raw frame sources for the media send loop
//!
//! Real capture is outside this crate; the send loop only depends on the
//! [`FrameSource`] capability.

use async_trait::async_trait;
use bytes::Bytes;

use super::format::{PixelFormat, Resolution};
use super::frame::VideoFrame;
use crate::error::Result;

/// Produces one raw frame per call
#[async_trait]
pub trait FrameSource: Send {
    /// Acquire the next raw frame
    async fn next_frame(&mut self) -> Result<VideoFrame>;
}

/// Synthetic BGR24 source that repeats a single solid colour frame
pub struct SolidColorSource {
    resolution: Resolution,
    data: Bytes,
    sequence: u64,
}

impl SolidColorSource {
    /// Create a source filled with the given BGR colour
    pub fn new(resolution: Resolution, bgr: [u8; 3]) -> Self {
        let pixels = resolution.pixels() as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&bgr);
        }

        Self {
            resolution,
            data: Bytes::from(data),
            sequence: 0,
        }
    }

    /// Solid green test pattern
    pub fn green(resolution: Resolution) -> Self {
        Self::new(resolution, [0, 255, 0])
    }
}

#[async_trait]
impl FrameSource for SolidColorSource {
    async fn next_frame(&mut self) -> Result<VideoFrame> {
        self.sequence += 1;
        Ok(VideoFrame::new(
            self.data.clone(),
            self.resolution,
            PixelFormat::Bgr24,
            self.sequence,
        ))
    }
}
