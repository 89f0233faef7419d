//! Encoder traits and common types

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Instant;

use crate::error::Result;
use crate::video::format::{PixelFormat, Resolution};
use crate::video::frame::VideoFrame;

/// Encoded units at or above this size are treated as likely keyframes
pub const KEYFRAME_SIZE_HINT: usize = 4096;

/// Encoder configuration
///
/// Fixed at startup. The defaults describe a real-time H.264 profile:
/// baseline, no B-frames, bounded GOP and minimal-latency tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    /// Target resolution
    pub resolution: Resolution,
    /// Input pixel format
    pub input_format: PixelFormat,
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
    /// Target frame rate
    pub fps: u32,
    /// Keyframe interval in frames
    pub gop_size: u32,
    /// Maximum consecutive B-frames
    pub max_b_frames: u32,
    /// x264 preset
    pub preset: String,
    /// x264 tune
    pub tune: String,
    /// H.264 profile
    pub profile: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::VGA,
            input_format: PixelFormat::Bgr24,
            bitrate_kbps: 500,
            fps: 30,
            gop_size: 10,
            max_b_frames: 0,
            preset: "ultrafast".to_string(),
            tune: "zerolatency".to_string(),
            profile: "baseline".to_string(),
        }
    }
}

impl EncoderConfig {
    pub fn h264(resolution: Resolution, bitrate_kbps: u32, fps: u32, gop_size: u32) -> Self {
        Self {
            resolution,
            bitrate_kbps,
            fps,
            gop_size,
            ..Default::default()
        }
    }
}

/// Encoded H.264 access unit in Annex-B byte-stream framing
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Encoded data
    pub data: Bytes,
    /// Frame sequence number
    pub sequence: u64,
    /// Encoding timestamp
    pub timestamp: Instant,
}

impl EncodedFrame {
    pub fn new(data: Bytes, sequence: u64) -> Self {
        Self {
            data,
            sequence,
            timestamp: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size-based keyframe hint (IDR units are much larger than P slices)
    pub fn likely_keyframe(&self) -> bool {
        self.data.len() >= KEYFRAME_SIZE_HINT
    }
}

/// Encode capability
///
/// Implementations range from in-process codec libraries to out-of-process
/// services. Each returned unit must be a directly packetizable Annex-B
/// byte stream.
#[async_trait]
pub trait Encoder: Send {
    /// Get encoder name
    fn name(&self) -> &str;

    /// Encode a raw frame into zero or more output units
    async fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<Bytes>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_realtime_profile() {
        let config = EncoderConfig::default();
        assert_eq!(config.max_b_frames, 0);
        assert_eq!(config.profile, "baseline");
        assert_eq!(config.preset, "ultrafast");
        assert_eq!(config.tune, "zerolatency");
    }

    #[test]
    fn test_keyframe_hint() {
        let small = EncodedFrame::new(Bytes::from(vec![0u8; 800]), 1);
        let large = EncodedFrame::new(Bytes::from(vec![0u8; KEYFRAME_SIZE_HINT]), 2);
        assert!(!small.likely_keyframe());
        assert!(large.likely_keyframe());
    }
}
