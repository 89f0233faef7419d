//! webrtc-rs peer connection binding

use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::config::WebRtcConfig;
use super::inbound::{spawn_track_reader, InboundFrameSink};
use super::session::{ConnectionState, IceGatheringState, PeerTransport, Session};
use super::track::TrackConfig;
use crate::error::{AppError, Result};
use crate::events::SessionEvent;

fn connection_state(state: RTCPeerConnectionState) -> Option<ConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(ConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
        _ => None,
    }
}

fn gathering_state(state: RTCIceGathererState) -> Option<IceGatheringState> {
    match state {
        RTCIceGathererState::New => Some(IceGatheringState::New),
        RTCIceGathererState::Gathering => Some(IceGatheringState::Gathering),
        RTCIceGathererState::Complete => Some(IceGatheringState::Complete),
        _ => None,
    }
}

/// Peer connection with one H.264 video transceiver
pub struct RtcPeer {
    pc: Arc<RTCPeerConnection>,
    track: Arc<TrackLocalStaticRTP>,
}

impl RtcPeer {
    /// Create the peer connection and its video transceiver
    pub async fn new(config: &WebRtcConfig, track_config: &TrackConfig) -> Result<Self> {
        // Only the configured H.264 codec, so the payload type is fixed
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_codec(track_config.codec_parameters(), RTPCodecType::Video)
            .map_err(|e| AppError::WebRtcError(format!("Failed to register codec: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(|e| {
            AppError::WebRtcError(format!("Failed to register interceptors: {}", e))
        })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = api
            .new_peer_connection(config.rtc_configuration())
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to create peer connection: {}", e)))?;
        let pc = Arc::new(pc);

        let track = track_config.rtp_track();
        let init = RTCRtpTransceiverInit {
            direction: track_config.direction.into(),
            send_encodings: vec![],
        };

        if track_config.direction.sends() {
            pc.add_transceiver_from_track(
                track.clone() as Arc<dyn TrackLocal + Send + Sync>,
                Some(init),
            )
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to add video track: {}", e)))?;
        } else {
            pc.add_transceiver_from_kind(RTPCodecType::Video, Some(init))
                .await
                .map_err(|e| {
                    AppError::WebRtcError(format!("Failed to add video transceiver: {}", e))
                })?;
        }

        info!(
            "Peer connection ready: H.264 pt={} {:?} stun={}",
            track_config.payload_type, track_config.direction, config.stun_server
        );

        Ok(Self { pc, track })
    }

    /// Local RTP track written by the send loop
    pub fn local_track(&self) -> Arc<TrackLocalStaticRTP> {
        self.track.clone()
    }

    /// Route transport callbacks to the session and inbound sink
    ///
    /// Handlers only spawn tasks, so the transport's worker context never
    /// waits on negotiation.
    pub fn attach(&self, session: &Arc<Session>, inbound: Arc<InboundFrameSink>) {
        let weak: Weak<Session> = Arc::downgrade(session);
        self.pc
            .on_ice_gathering_state_change(Box::new(move |s: RTCIceGathererState| {
                let weak = weak.clone();
                Box::pin(async move {
                    let Some(state) = gathering_state(s) else {
                        return;
                    };
                    if let Some(session) = weak.upgrade() {
                        tokio::spawn(async move {
                            session.on_gathering_state(state).await;
                        });
                    }
                })
            }));

        let weak: Weak<Session> = Arc::downgrade(session);
        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let weak = weak.clone();
                Box::pin(async move {
                    let Some(state) = connection_state(s) else {
                        return;
                    };
                    if let Some(session) = weak.upgrade() {
                        tokio::spawn(async move {
                            session.on_connection_state(state).await;
                        });
                    }
                })
            }));

        let session_id = session.session_id().to_string();
        self.pc
            .on_signaling_state_change(Box::new(move |s: RTCSignalingState| {
                debug!("Peer {} signaling state: {}", session_id, s);
                Box::pin(async {})
            }));

        // Non-trickle: candidates end up in the local description
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                if let Some(c) = candidate {
                    debug!("Local ICE candidate: {} {}:{}", c.protocol, c.address, c.port);
                }
                Box::pin(async {})
            }));

        let weak: Weak<Session> = Arc::downgrade(session);
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  transceiver: Arc<RTCRtpTransceiver>| {
                let codec = track.codec().capability.mime_type;
                let mid = transceiver.mid().map(|m| m.to_string()).unwrap_or_default();
                info!("Remote track {} (mid {}, {})", track.id(), mid, codec);

                if let Some(session) = weak.upgrade() {
                    session.events().publish(SessionEvent::RemoteTrack {
                        session_id: session.session_id().to_string(),
                        mid,
                        codec,
                    });
                }

                spawn_track_reader(track, inbound.clone());
                Box::pin(async {})
            },
        ));
    }
}

#[async_trait]
impl PeerTransport for RtcPeer {
    async fn create_offer(&self) -> Result<()> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to create offer: {}", e)))?;

        // Starts ICE gathering
        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to set local description: {}", e)))?;
        Ok(())
    }

    async fn local_description(&self) -> Option<String> {
        self.pc.local_description().await.map(|d| d.sdp)
    }

    async fn apply_answer(&self, sdp: &str) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp.to_string())
            .map_err(|e| AppError::MalformedAnswer(format!("Invalid answer SDP: {}", e)))?;

        self.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| AppError::MalformedAnswer(format!("Failed to set remote description: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        if self.pc.connection_state() == RTCPeerConnectionState::Closed {
            return Ok(());
        }
        self.pc
            .close()
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to close peer connection: {}", e)))?;
        info!("Peer connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::decoder::AnnexBDecoder;

    #[test]
    fn test_state_mapping() {
        assert_eq!(
            connection_state(RTCPeerConnectionState::Connected),
            Some(ConnectionState::Connected)
        );
        assert_eq!(connection_state(RTCPeerConnectionState::Unspecified), None);
        assert_eq!(
            gathering_state(RTCIceGathererState::Complete),
            Some(IceGatheringState::Complete)
        );
        assert_eq!(gathering_state(RTCIceGathererState::Closed), None);
    }

    #[tokio::test]
    async fn test_offer_has_single_h264_video_line() {
        // Host candidates only, no network access needed
        let config = WebRtcConfig {
            stun_server: String::new(),
        };
        let peer = RtcPeer::new(&config, &TrackConfig::default()).await.unwrap();
        peer.attach(
            &crate::webrtc::session::tests::session_with(
                crate::webrtc::session::tests::MockTransport::new(None),
                crate::webrtc::session::tests::MockSignaling::answering("S2"),
            ),
            InboundFrameSink::new(Box::new(AnnexBDecoder::new())),
        );

        peer.create_offer().await.unwrap();
        let sdp = peer.local_description().await.unwrap();

        assert_eq!(sdp.matches("m=video").count(), 1);
        assert!(sdp.contains("a=rtpmap:96 H264/90000"));
        assert!(sdp.contains("packetization-mode=1"));
        assert!(sdp.contains("a=sendrecv"));

        peer.close().await.unwrap();
    }
}
