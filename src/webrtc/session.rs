//! Session negotiation state machine
//!
//! A [`Session`] owns one peer connection to the remote processing peer.
//! Transport callbacks feed it gathering and connection state changes; when
//! gathering completes for the first time it performs the single offer/answer
//! exchange. The Media Send Loop only reads [`Session::is_established`].

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::signaling::{PipelineDescriptor, SignalingExchange};
use crate::error::{AppError, Result};
use crate::events::{EventBus, SessionEvent};

/// Peer connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Failed and Closed end the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::New => write!(f, "new"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// ICE gathering state, ordered by progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
}

/// Offer/answer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
}

/// SDP description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// SDP text with its type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: SdpType,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: SdpType::Offer,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: SdpType::Answer,
        }
    }
}

/// Transport operations the session drives
///
/// State changes flow the other way, through [`Session::on_gathering_state`]
/// and [`Session::on_connection_state`].
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Create the local offer and start candidate gathering
    async fn create_offer(&self) -> Result<()>;

    /// Current local description, including gathered candidates
    async fn local_description(&self) -> Option<String>;

    /// Apply the remote answer
    async fn apply_answer(&self, sdp: &str) -> Result<()>;

    /// Tear down the connection
    async fn close(&self) -> Result<()>;
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub connection_state: ConnectionState,
    pub ice_gathering_state: IceGatheringState,
    pub signaling_state: SignalingState,
    pub local_description: Option<SessionDescription>,
    pub remote_description: Option<SessionDescription>,
    pub established: bool,
}

struct SessionState {
    connection: ConnectionState,
    gathering: IceGatheringState,
    signaling: SignalingState,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
}

/// One negotiated connection to the remote peer
pub struct Session {
    session_id: String,
    transport: Arc<dyn PeerTransport>,
    signaling: Arc<dyn SignalingExchange>,
    prompt: PipelineDescriptor,
    events: Arc<EventBus>,
    state: Mutex<SessionState>,
    /// Set on Connected, cleared on Failed/Closed
    established: AtomicBool,
    exchange_fired: AtomicBool,
    state_tx: watch::Sender<ConnectionState>,
}

impl Session {
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        signaling: Arc<dyn SignalingExchange>,
        prompt: PipelineDescriptor,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::New);
        let session_id = uuid::Uuid::new_v4().to_string();
        info!("Created session {}", session_id);

        Arc::new(Self {
            session_id,
            transport,
            signaling,
            prompt,
            events,
            state: Mutex::new(SessionState {
                connection: ConnectionState::New,
                gathering: IceGatheringState::New,
                signaling: SignalingState::Stable,
                local_description: None,
                remote_description: None,
            }),
            established: AtomicBool::new(false),
            exchange_fired: AtomicBool::new(false),
            state_tx,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether media may be sent
    ///
    /// True from the first Connected until the session fails or closes.
    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    /// Whether the session reached Failed or Closed
    pub fn is_terminated(&self) -> bool {
        self.state_tx.borrow().is_terminal()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to connection state changes
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            session_id: self.session_id.clone(),
            connection_state: state.connection,
            ice_gathering_state: state.gathering,
            signaling_state: state.signaling,
            local_description: state.local_description.clone(),
            remote_description: state.remote_description.clone(),
            established: self.is_established(),
        }
    }

    /// Create the local offer (New -> Connecting)
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.connection != ConnectionState::New {
                return Err(AppError::WebRtcError(format!(
                    "session already started ({})",
                    state.connection
                )));
            }
            state.connection = ConnectionState::Connecting;
            self.state_tx.send_replace(ConnectionState::Connecting);
        }
        self.publish_connection_state(ConnectionState::Connecting);

        if let Err(e) = self.transport.create_offer().await {
            self.fail(format!("Failed to create offer: {}", e)).await;
            return Err(e);
        }

        let offer = self.transport.local_description().await;
        let moved = {
            let mut state = self.state.lock();
            // Gathering may complete before create_offer returns, in which
            // case the exchange already recorded the offer
            if state.connection.is_terminal() || state.local_description.is_some() {
                false
            } else {
                if let Some(sdp) = offer {
                    state.local_description = Some(SessionDescription::offer(sdp));
                }
                state.signaling = SignalingState::HaveLocalOffer;
                true
            }
        };

        if moved {
            debug!("Session {} has local offer", self.session_id);
            self.publish_signaling_state(SignalingState::HaveLocalOffer);
        }
        Ok(())
    }

    /// Transport callback: ICE gathering state changed
    ///
    /// Regressions are ignored. The first Complete triggers the signaling
    /// exchange.
    pub async fn on_gathering_state(&self, gathering: IceGatheringState) {
        let advanced = {
            let mut state = self.state.lock();
            if gathering > state.gathering {
                state.gathering = gathering;
                true
            } else {
                false
            }
        };

        if !advanced {
            debug!(
                "Session {} ignoring gathering state {:?}",
                self.session_id, gathering
            );
            return;
        }

        info!("Session {} ICE gathering: {:?}", self.session_id, gathering);
        self.events.publish(SessionEvent::GatheringStateChanged {
            session_id: self.session_id.clone(),
            state: gathering,
        });

        if gathering == IceGatheringState::Complete {
            self.exchange_descriptions().await;
        }
    }

    /// Transport callback: peer connection state changed
    pub async fn on_connection_state(&self, connection: ConnectionState) {
        {
            let mut state = self.state.lock();
            if state.connection.is_terminal() {
                debug!(
                    "Session {} is {}, ignoring {}",
                    self.session_id, state.connection, connection
                );
                return;
            }
            // The transport reports New before negotiation starts
            if connection == state.connection || connection == ConnectionState::New {
                return;
            }

            state.connection = connection;
            match connection {
                ConnectionState::Connected => self.established.store(true, Ordering::Release),
                ConnectionState::Failed | ConnectionState::Closed => {
                    self.established.store(false, Ordering::Release)
                }
                _ => {}
            }
            self.state_tx.send_replace(connection);
        }

        match connection {
            ConnectionState::Connected => info!("Session {} connected", self.session_id),
            ConnectionState::Failed => error!("Session {} transport failed", self.session_id),
            ConnectionState::Disconnected => warn!("Session {} disconnected", self.session_id),
            _ => info!("Session {} state: {}", self.session_id, connection),
        }
        self.publish_connection_state(connection);
    }

    /// Close the session (-> Closed) and tear down the transport
    pub async fn close(&self) -> Result<()> {
        let changed = {
            let mut state = self.state.lock();
            if state.connection.is_terminal() {
                false
            } else {
                state.connection = ConnectionState::Closed;
                self.established.store(false, Ordering::Release);
                self.state_tx.send_replace(ConnectionState::Closed);
                true
            }
        };

        if changed {
            info!("Closing session {}", self.session_id);
            self.publish_connection_state(ConnectionState::Closed);
        }
        self.transport.close().await
    }

    async fn exchange_descriptions(&self) {
        if self
            .exchange_fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        if self.is_terminated() {
            debug!(
                "Session {} terminated before gathering completed",
                self.session_id
            );
            return;
        }

        let offer = match self.transport.local_description().await {
            Some(sdp) if !sdp.is_empty() => sdp,
            _ => {
                self.fail("No local description after ICE gathering".to_string())
                    .await;
                return;
            }
        };
        let moved = {
            let mut state = self.state.lock();
            state.local_description = Some(SessionDescription::offer(offer.clone()));
            let moved = state.signaling == SignalingState::Stable;
            state.signaling = SignalingState::HaveLocalOffer;
            moved
        };
        if moved {
            debug!("Session {} has local offer", self.session_id);
            self.publish_signaling_state(SignalingState::HaveLocalOffer);
        }

        let answer = match self.signaling.exchange(&offer, &self.prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                self.fail(e.to_string()).await;
                return;
            }
        };

        if let Err(e) = self.transport.apply_answer(&answer).await {
            let e = AppError::MalformedAnswer(format!("remote description rejected: {}", e));
            self.fail(e.to_string()).await;
            return;
        }

        {
            let mut state = self.state.lock();
            if state.connection.is_terminal() {
                return;
            }
            state.remote_description = Some(SessionDescription::answer(answer));
            state.signaling = SignalingState::Stable;
        }

        info!("Session {} negotiated", self.session_id);
        self.publish_signaling_state(SignalingState::Stable);
    }

    /// Terminal negotiation failure
    async fn fail(&self, reason: String) {
        let changed = {
            let mut state = self.state.lock();
            if state.connection.is_terminal() {
                false
            } else {
                state.connection = ConnectionState::Failed;
                self.established.store(false, Ordering::Release);
                self.state_tx.send_replace(ConnectionState::Failed);
                true
            }
        };
        if !changed {
            return;
        }

        error!("Session {} negotiation failed: {}", self.session_id, reason);
        self.publish_connection_state(ConnectionState::Failed);
        self.events.publish(SessionEvent::NegotiationFailed {
            session_id: self.session_id.clone(),
            reason,
        });

        if let Err(e) = self.transport.close().await {
            warn!("Failed to close transport: {}", e);
        }
    }

    fn publish_connection_state(&self, state: ConnectionState) {
        self.events.publish(SessionEvent::ConnectionStateChanged {
            session_id: self.session_id.clone(),
            state,
        });
    }

    fn publish_signaling_state(&self, state: SignalingState) {
        self.events.publish(SessionEvent::SignalingStateChanged {
            session_id: self.session_id.clone(),
            state,
        });
    }
}
