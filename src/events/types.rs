//! Session event types
//!
//! Defines the notifications a session broadcasts through the event bus.

use serde::{Deserialize, Serialize};

use crate::webrtc::session::{ConnectionState, IceGatheringState, SignalingState};

/// Session event
///
/// # Serialization
///
/// ```json
/// {
///   "event": "session.connection_state",
///   "data": { "session_id": "…", "state": "connected" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    /// Peer connection state accepted by the state machine
    #[serde(rename = "session.connection_state")]
    ConnectionStateChanged {
        session_id: String,
        state: ConnectionState,
    },

    /// ICE gathering progressed
    #[serde(rename = "session.gathering_state")]
    GatheringStateChanged {
        session_id: String,
        state: IceGatheringState,
    },

    /// Offer/answer state changed
    #[serde(rename = "session.signaling_state")]
    SignalingStateChanged {
        session_id: String,
        state: SignalingState,
    },

    /// Negotiation ended in a terminal failure
    #[serde(rename = "session.negotiation_failed")]
    NegotiationFailed { session_id: String, reason: String },

    /// The remote peer opened a media track
    #[serde(rename = "session.remote_track")]
    RemoteTrack {
        session_id: String,
        mid: String,
        codec: String,
    },
}

impl SessionEvent {
    /// Get the event name (for logging)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ConnectionStateChanged { .. } => "session.connection_state",
            Self::GatheringStateChanged { .. } => "session.gathering_state",
            Self::SignalingStateChanged { .. } => "session.signaling_state",
            Self::NegotiationFailed { .. } => "session.negotiation_failed",
            Self::RemoteTrack { .. } => "session.remote_track",
        }
    }
}
