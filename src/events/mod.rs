//! Event system for session state notifications
//!
//! This module provides an event bus for broadcasting session events
//! to loggers and other subscribers.

pub mod types;

pub use types::SessionEvent;

use tokio::sync::broadcast;

/// Event channel capacity (ring buffer size)
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Event bus for broadcasting session events
///
/// # Example
///
/// ```no_run
/// use ai_stream_client::events::{EventBus, SessionEvent};
///
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
///
/// bus.publish(SessionEvent::NegotiationFailed {
///     session_id: "s1".to_string(),
///     reason: "signaling unreachable".to_string(),
/// });
///
/// tokio::spawn(async move {
///     while let Ok(event) = rx.recv().await {
///         println!("Received event: {:?}", event);
///     }
/// });
/// ```
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to events
    ///
    /// Slow subscribers receive a `Lagged` error and miss some events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
