//! WebRTC client for the remote AI processing peer
//!
//! Architecture:
//! ```text
//! FrameSource -> EncoderAdapter -> fragment() -> RtpPacketSender -> RtcPeer
//!                                                                     |
//!                        Session <---- gathering/connection events ---+
//!                           |
//!                           +-- on gathering Complete --> HttpSignalingClient
//!
//! RtcPeer (remote track) -> AccessUnitAssembler -> InboundFrameSink -> Decoder
//! ```

pub mod config;
pub mod inbound;
pub mod packetizer;
pub mod peer;
pub mod rtp;
pub mod session;
pub mod signaling;
pub mod track;

pub use config::WebRtcConfig;
pub use inbound::{spawn_track_reader, InboundFrameSink, InboundStats};
pub use packetizer::fragment;
pub use peer::RtcPeer;
pub use rtp::{PacketSink, RtpPacketSender};
pub use session::{
    ConnectionState, IceGatheringState, PeerTransport, Session, SessionDescription,
    SessionSnapshot, SignalingState,
};
pub use signaling::{HttpSignalingClient, PipelineDescriptor, SignalingExchange};
pub use track::{TrackConfig, TrackDirection};
