//! Configuration loading
//!
//! Settings come from an optional JSON file; missing fields fall back to
//! defaults. Command line overrides are applied by the binary afterwards.

pub mod schema;

pub use schema::*;

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{AppError, Result};

/// Load configuration from a JSON file, or defaults when no path is given
pub async fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = path else {
        debug!("No config file given, using defaults");
        return Ok(AppConfig::default());
    };

    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        AppError::Config(format!("Failed to read config {}: {}", path.display(), e))
    })?;
    let config: AppConfig = serde_json::from_str(&raw)?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Command line overrides, applied on top of the loaded file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub signaling_url: Option<String>,
    pub stun_server: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub prompt_path: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = &self.signaling_url {
            config.signaling.url = url.clone();
        }
        if let Some(stun) = &self.stun_server {
            config.webrtc.stun_server = stun.clone();
        }
        if let Some(width) = self.width {
            config.video.width = width;
        }
        if let Some(height) = self.height {
            config.video.height = height;
        }
        if let Some(fps) = self.fps {
            config.video.fps = fps;
        }
        if let Some(path) = &self.prompt_path {
            config.prompt_path = Some(path.clone());
        }
    }
}

/// Load, override and validate
pub async fn resolve_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<AppConfig> {
    let mut config = load_config(path).await?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}
