//! Outbound video track model

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;

/// H.264 MIME type
pub const MIME_TYPE_H264: &str = "video/H264";

/// Constrained baseline 3.1, non-interleaved packetization
pub const DEFAULT_H264_FMTP: &str =
    "packetization-mode=1;profile-level-id=42e01f;level-asymmetry-allowed=1";

/// Media direction of the track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackDirection {
    SendOnly,
    RecvOnly,
    SendRecv,
}

impl TrackDirection {
    pub fn sends(&self) -> bool {
        matches!(self, TrackDirection::SendOnly | TrackDirection::SendRecv)
    }

    pub fn receives(&self) -> bool {
        matches!(self, TrackDirection::RecvOnly | TrackDirection::SendRecv)
    }
}

impl From<TrackDirection> for RTCRtpTransceiverDirection {
    fn from(direction: TrackDirection) -> Self {
        match direction {
            TrackDirection::SendOnly => RTCRtpTransceiverDirection::Sendonly,
            TrackDirection::RecvOnly => RTCRtpTransceiverDirection::Recvonly,
            TrackDirection::SendRecv => RTCRtpTransceiverDirection::Sendrecv,
        }
    }
}

/// The single negotiated video line
///
/// Created once per session and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// RTP payload type
    pub payload_type: u8,
    /// RTP clock rate
    pub clock_rate: u32,
    /// Synchronization source identifier
    pub ssrc: u32,
    /// Media identifier
    pub mid: String,
    /// Track ID
    pub track_id: String,
    /// Stream ID
    pub stream_id: String,
    pub direction: TrackDirection,
    /// Codec parameter string (a=fmtp)
    pub fmtp: String,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            payload_type: 96,
            clock_rate: 90000,
            ssrc: 42,
            mid: "video".to_string(),
            track_id: "video-send".to_string(),
            stream_id: "ai-stream".to_string(),
            direction: TrackDirection::SendRecv,
            fmtp: DEFAULT_H264_FMTP.to_string(),
        }
    }
}

impl TrackConfig {
    /// Codec capability advertised for this track
    pub fn codec_capability(&self) -> RTCRtpCodecCapability {
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_H264.to_string(),
            clock_rate: self.clock_rate,
            channels: 0,
            sdp_fmtp_line: self.fmtp.clone(),
            rtcp_feedback: vec![],
        }
    }

    /// Codec registration for the media engine
    pub fn codec_parameters(&self) -> RTCRtpCodecParameters {
        RTCRtpCodecParameters {
            capability: self.codec_capability(),
            payload_type: self.payload_type,
            ..Default::default()
        }
    }

    /// Create the local RTP track
    pub fn rtp_track(&self) -> Arc<TrackLocalStaticRTP> {
        Arc::new(TrackLocalStaticRTP::new(
            self.codec_capability(),
            self.track_id.clone(),
            self.stream_id.clone(),
        ))
    }
}
