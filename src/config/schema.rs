use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::video::format::Resolution;

// Re-export track and ICE settings from the webrtc module
pub use crate::webrtc::config::WebRtcConfig;
pub use crate::webrtc::track::TrackConfig;

/// Largest accepted frame width or height
pub const MAX_DIMENSION: u32 = 8192;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Signaling endpoint settings
    pub signaling: SignalingConfig,
    /// ICE settings
    pub webrtc: WebRtcConfig,
    /// Outbound video track parameters
    pub track: TrackConfig,
    /// Encoder and send loop settings
    pub video: VideoConfig,
    /// Pipeline descriptor JSON file sent with the offer
    /// If unset, the built-in pass-through pipeline is used
    pub prompt_path: Option<PathBuf>,
}

impl AppConfig {
    /// Check settings that would make the send loop or encoder unusable
    pub fn validate(&self) -> Result<()> {
        if self.signaling.url.trim().is_empty() {
            return Err(AppError::Config("signaling.url must not be empty".to_string()));
        }
        if self.video.fps == 0 {
            return Err(AppError::Config("video.fps must be greater than 0".to_string()));
        }
        if self.video.width == 0
            || self.video.height == 0
            || self.video.width > MAX_DIMENSION
            || self.video.height > MAX_DIMENSION
        {
            return Err(AppError::Config(format!(
                "invalid video resolution {}x{}",
                self.video.width, self.video.height
            )));
        }
        if self.video.max_packet_size == 0 {
            return Err(AppError::Config(
                "video.max_packet_size must be greater than 0".to_string(),
            ));
        }
        if self.video.gop_size == 0 {
            return Err(AppError::Config("video.gop_size must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Signaling endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalingConfig {
    /// Offer endpoint (e.g., "http://127.0.0.1:8889/offer")
    pub url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8889/offer".to_string(),
            timeout_secs: 10,
        }
    }
}

impl SignalingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Encoder and media send loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VideoConfig {
    /// Resolution width
    pub width: u32,
    /// Resolution height
    pub height: u32,
    /// Frame rate (send loop cadence)
    pub fps: u32,
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
    /// Keyframe interval in frames
    pub gop_size: u32,
    /// Maximum transport packet size in bytes
    pub max_packet_size: usize,
    /// Encoder output units smaller than this are dropped (0 disables)
    pub min_unit_size: usize,
    /// ffmpeg binary used for encoding
    pub ffmpeg_path: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            bitrate_kbps: 500,
            gop_size: 10,
            max_packet_size: 1200,
            min_unit_size: 500,
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl VideoConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Send loop period (33ms at 30fps)
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.fps.max(1) as u64)
    }
}
