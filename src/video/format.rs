//! Pixel format and resolution definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported raw pixel formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    /// YUV420 planar format
    Yuv420,
    /// NV12 semi-planar format (Y plane + interleaved UV)
    Nv12,
    /// RGB24 format (3 bytes per pixel)
    Rgb24,
    /// BGR24 format (3 bytes per pixel)
    Bgr24,
}

impl PixelFormat {
    /// Name of this format as understood by ffmpeg's `-pix_fmt`
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            PixelFormat::Yuv420 => "yuv420p",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgr24 => "bgr24",
        }
    }

    /// Calculate expected frame size for a given resolution
    pub fn frame_size(&self, resolution: Resolution) -> usize {
        let pixels = resolution.pixels() as usize;
        match self {
            PixelFormat::Yuv420 | PixelFormat::Nv12 => pixels * 3 / 2,
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => pixels * 3,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Yuv420 => "YUV420",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Bgr24 => "BGR24",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "YUV420" | "I420" | "YUV420P" => Ok(PixelFormat::Yuv420),
            "NV12" => Ok(PixelFormat::Nv12),
            "RGB24" => Ok(PixelFormat::Rgb24),
            "BGR24" => Ok(PixelFormat::Bgr24),
            _ => Err(format!("Unknown pixel format: {}", s)),
        }
    }
}

/// Resolution (width x height)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Get total pixels
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Common resolutions
    pub const VGA: Resolution = Resolution {
        width: 640,
        height: 480,
    };
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size() {
        assert_eq!(PixelFormat::Bgr24.frame_size(Resolution::VGA), 640 * 480 * 3);
        assert_eq!(PixelFormat::Yuv420.frame_size(Resolution::VGA), 640 * 480 * 3 / 2);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_frame_size_does_not_overflow_u32() {
        let res = Resolution::new(70_000, 70_000);
        assert_eq!(PixelFormat::Bgr24.frame_size(res), 70_000usize * 70_000 * 3);
    }

    #[test]
    fn test_parse_pixel_format() {
        assert_eq!("bgr24".parse::<PixelFormat>().unwrap(), PixelFormat::Bgr24);
        assert_eq!("I420".parse::<PixelFormat>().unwrap(), PixelFormat::Yuv420);
        assert!("mjpeg".parse::<PixelFormat>().is_err());
    }

    #[test]
    fn test_resolution_display() {
        assert_eq!(Resolution::VGA.to_string(), "640x480");
    }
}
