//! Raw video frame data structures

use bytes::Bytes;
use std::time::Instant;

use super::format::{PixelFormat, Resolution};

/// A raw video frame with metadata
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Raw frame data
    data: Bytes,
    /// Frame resolution
    pub resolution: Resolution,
    /// Pixel format
    pub format: PixelFormat,
    /// Frame sequence number
    pub sequence: u64,
    /// Timestamp when frame was produced
    pub capture_ts: Instant,
}

impl VideoFrame {
    /// Create a new video frame
    pub fn new(data: Bytes, resolution: Resolution, format: PixelFormat, sequence: u64) -> Self {
        Self {
            data,
            resolution,
            format,
            sequence,
            capture_ts: Instant::now(),
        }
    }

    /// Create a frame from a Vec<u8>
    pub fn from_vec(
        data: Vec<u8>,
        resolution: Resolution,
        format: PixelFormat,
        sequence: u64,
    ) -> Self {
        Self::new(Bytes::from(data), resolution, format, sequence)
    }

    /// Get frame data as bytes slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get frame data as Bytes (cheap clone)
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Get data length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if frame is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the buffer matches the size implied by format and resolution
    pub fn is_complete(&self) -> bool {
        self.data.len() == self.format.frame_size(self.resolution)
    }
}
