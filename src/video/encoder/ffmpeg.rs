//! H.264 encoder backed by the ffmpeg command line tool
//!
//! Every call runs one short-lived `ffmpeg` process: the raw frame goes in
//! on stdin and an Annex-B byte stream comes back on stdout. Parameter sets
//! are repeated in every output so each unit can be decoded on its own.

use async_trait::async_trait;
use bytes::Bytes;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::traits::{Encoder, EncoderConfig};
use crate::error::{AppError, Result};
use crate::video::frame::VideoFrame;

/// Upper bound on one ffmpeg run; the child is killed when it expires
pub const DEFAULT_ENCODE_TIMEOUT: Duration = Duration::from_secs(2);

/// ffmpeg/libx264 encoder
pub struct FfmpegEncoder {
    config: EncoderConfig,
    ffmpeg_path: String,
    timeout: Duration,
    frames_encoded: u64,
}

impl FfmpegEncoder {
    pub fn new(config: EncoderConfig, ffmpeg_path: impl Into<String>) -> Self {
        Self {
            config,
            ffmpeg_path: ffmpeg_path.into(),
            timeout: DEFAULT_ENCODE_TIMEOUT,
            frames_encoded: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check that ffmpeg can be executed and provides libx264
    pub async fn probe(ffmpeg_path: &str) -> Result<()> {
        let output = Command::new(ffmpeg_path)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AppError::VideoError(format!("Failed to run {}: {}", ffmpeg_path, e)))?;

        if !output.status.success() {
            return Err(AppError::VideoError(format!(
                "{} -encoders exited with {}",
                ffmpeg_path, output.status
            )));
        }

        let encoders = String::from_utf8_lossy(&output.stdout);
        if !encoders.contains("libx264") {
            return Err(AppError::VideoError(format!(
                "{} was built without libx264",
                ffmpeg_path
            )));
        }

        info!("Using {} with libx264", ffmpeg_path);
        Ok(())
    }

    /// Command line for encoding a single raw frame
    pub fn build_args(&self) -> Vec<String> {
        let c = &self.config;
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        // Raw input on stdin
        args.extend([
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            c.input_format.ffmpeg_name().to_string(),
            "-video_size".to_string(),
            c.resolution.to_string(),
            "-framerate".to_string(),
            c.fps.to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-an".to_string(),
        ]);

        // Annex-B H.264 on stdout
        args.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            c.preset.clone(),
            "-tune".to_string(),
            c.tune.clone(),
            "-profile:v".to_string(),
            c.profile.clone(),
            "-bf".to_string(),
            c.max_b_frames.to_string(),
            "-g".to_string(),
            c.gop_size.to_string(),
            "-b:v".to_string(),
            format!("{}k", c.bitrate_kbps),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-x264-params".to_string(),
            format!("keyint={}:scenecut=0:repeat-headers=1", c.gop_size),
            "-f".to_string(),
            "h264".to_string(),
            "pipe:1".to_string(),
        ]);

        args
    }

    fn check_input(&self, frame: &VideoFrame) -> Result<()> {
        if frame.format != self.config.input_format || frame.resolution != self.config.resolution {
            return Err(AppError::EncodeFailure(format!(
                "frame is {} {}, encoder expects {} {}",
                frame.resolution, frame.format, self.config.resolution, self.config.input_format
            )));
        }
        if !frame.is_complete() {
            return Err(AppError::EncodeFailure(format!(
                "incomplete frame: {} bytes",
                frame.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg-libx264"
    }

    async fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<Bytes>> {
        self.check_input(frame)?;

        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.build_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::EncodeFailure(format!("Failed to spawn ffmpeg: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::EncodeFailure("ffmpeg stdin unavailable".to_string()))?;

        // Feed stdin concurrently so a full stdout pipe cannot stall the child
        let data = frame.data_bytes();
        let writer = tokio::spawn(async move {
            stdin.write_all(&data).await?;
            stdin.shutdown().await
        });

        // Dropping the wait future on timeout kills the child
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AppError::EncodeFailure(format!("ffmpeg timed out after {:?}", self.timeout))
            })?
            .map_err(|e| AppError::EncodeFailure(format!("ffmpeg did not finish: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::EncodeFailure(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(AppError::EncodeFailure(format!("Failed to write frame: {}", e)))
            }
            Err(e) => return Err(AppError::EncodeFailure(format!("Writer task failed: {}", e))),
        }

        self.frames_encoded += 1;
        debug!(
            "ffmpeg encoded frame #{} ({} bytes)",
            self.frames_encoded,
            output.stdout.len()
        );

        if output.stdout.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![Bytes::from(output.stdout)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::format::{PixelFormat, Resolution};

    #[test]
    fn test_args_describe_realtime_profile() {
        let encoder = FfmpegEncoder::new(EncoderConfig::default(), "ffmpeg");
        let args = encoder.build_args().join(" ");

        assert!(args.contains("-pix_fmt bgr24 -video_size 640x480"));
        assert!(args.contains("-preset ultrafast"));
        assert!(args.contains("-tune zerolatency"));
        assert!(args.contains("-profile:v baseline"));
        assert!(args.contains("-bf 0"));
        assert!(args.contains("-g 10"));
        assert!(args.contains("keyint=10:scenecut=0:repeat-headers=1"));
        assert!(args.ends_with("-f h264 pipe:1"));
    }

    #[tokio::test]
    async fn test_rejects_mismatched_frame() {
        let mut encoder = FfmpegEncoder::new(EncoderConfig::default(), "ffmpeg");
        let frame = VideoFrame::from_vec(vec![0; 12], Resolution::new(2, 2), PixelFormat::Bgr24, 1);

        assert!(matches!(
            encoder.encode(&frame).await,
            Err(AppError::EncodeFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_encode_failure() {
        let config = EncoderConfig::h264(Resolution::new(2, 2), 100, 30, 10);
        let mut encoder = FfmpegEncoder::new(config, "/nonexistent/ffmpeg");
        let frame = VideoFrame::from_vec(vec![0; 12], Resolution::new(2, 2), PixelFormat::Bgr24, 1);

        assert!(matches!(
            encoder.encode(&frame).await,
            Err(AppError::EncodeFailure(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stalled_encoder_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("ffmpeg");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = EncoderConfig::h264(Resolution::new(2, 2), 100, 30, 10);
        let mut encoder = FfmpegEncoder::new(config, script.to_string_lossy())
            .with_timeout(Duration::from_millis(200));
        let frame = VideoFrame::from_vec(vec![0; 12], Resolution::new(2, 2), PixelFormat::Bgr24, 1);

        let started = std::time::Instant::now();
        let result = encoder.encode(&frame).await;
        assert!(matches!(result, Err(AppError::EncodeFailure(ref msg)) if msg.contains("timed out")));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_probe_missing_binary() {
        assert!(matches!(
            FfmpegEncoder::probe("/nonexistent/ffmpeg").await,
            Err(AppError::VideoError(_))
        ));
    }
}
