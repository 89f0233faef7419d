//! WebRTC configuration

use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;

/// Default public STUN server
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// ICE configuration
///
/// A single STUN server, no TURN. Candidates are never trickled: the
/// complete local description is exchanged once gathering finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// STUN server URL
    pub stun_server: String,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            stun_server: DEFAULT_STUN_SERVER.to_string(),
        }
    }
}

impl WebRtcConfig {
    /// Build the peer connection configuration
    pub fn rtc_configuration(&self) -> RTCConfiguration {
        let ice_servers = if self.stun_server.is_empty() {
            // Host candidates only
            vec![]
        } else {
            vec![RTCIceServer {
                urls: vec![self.stun_server.clone()],
                ..Default::default()
            }]
        };

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_stun_server() {
        let config = WebRtcConfig::default().rtc_configuration();
        assert_eq!(config.ice_servers.len(), 1);
        assert_eq!(config.ice_servers[0].urls, vec![DEFAULT_STUN_SERVER.to_string()]);
        assert!(config.ice_servers[0].username.is_empty());
    }

    #[test]
    fn test_empty_stun_means_host_only() {
        let config = WebRtcConfig {
            stun_server: String::new(),
        };
        assert!(config.rtc_configuration().ice_servers.is_empty());
    }
}
