//! Cadence-driven media send loop
//!
//! Each tick: acquire one raw frame, encode it, fragment every surviving
//! unit and hand the packets to the transport in order. Nothing is queued
//! between stages; a slow encode delays that tick and missed ticks are
//! skipped rather than caught up.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::video::encoder::EncoderAdapter;
use crate::video::source::FrameSource;
use crate::webrtc::packetizer::fragment;
use crate::webrtc::rtp::PacketSink;
use crate::webrtc::session::Session;

/// Send loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SendLoopStats {
    /// Ticks observed
    pub ticks: u64,
    /// Ticks skipped because the session was not established
    pub idle_ticks: u64,
    /// Encoded units that passed the size filter
    pub frames_encoded: u64,
    /// Units dropped by the size filter
    pub units_dropped: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub encode_failures: u64,
    pub send_failures: u64,
}

/// Media send loop for one session
pub struct MediaSendLoop {
    session: Arc<Session>,
    source: Box<dyn FrameSource>,
    encoder: EncoderAdapter,
    sink: Arc<dyn PacketSink>,
    max_packet_size: usize,
    period: Duration,
    stats: SendLoopStats,
}

impl MediaSendLoop {
    pub fn new(
        session: Arc<Session>,
        source: Box<dyn FrameSource>,
        encoder: EncoderAdapter,
        sink: Arc<dyn PacketSink>,
        max_packet_size: usize,
        period: Duration,
    ) -> Self {
        Self {
            session,
            source,
            encoder,
            sink,
            max_packet_size,
            period,
            stats: SendLoopStats::default(),
        }
    }

    pub fn stats(&self) -> SendLoopStats {
        SendLoopStats {
            units_dropped: self.encoder.units_dropped(),
            ..self.stats
        }
    }

    /// Run until shutdown or until the session fails or closes
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> SendLoopStats {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Media send loop started: {} every {:?}, max packet {} bytes",
            self.encoder.encoder_name(),
            self.period,
            self.max_packet_size
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => {
                    info!("Media send loop stopping: shutdown");
                    break;
                }
            }

            if self.session.is_terminated() {
                info!(
                    "Media send loop stopping: session {}",
                    self.session.connection_state()
                );
                break;
            }

            self.stats.ticks += 1;
            if !self.session.is_established() {
                self.stats.idle_ticks += 1;
                trace!("Session not established, skipping tick");
                continue;
            }

            self.tick().await;
        }

        let stats = self.stats();
        info!(
            "Media send loop finished: {} packets, {} bytes, {} units dropped",
            stats.packets_sent, stats.bytes_sent, stats.units_dropped
        );
        stats
    }

    /// One encode, fragment and send pass
    pub async fn tick(&mut self) {
        let frame = match self.source.next_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Frame source failed: {}", e);
                return;
            }
        };

        let units = match self.encoder.encode(&frame).await {
            Ok(units) => units,
            Err(e) => {
                debug_assert!(!e.is_fatal_to_negotiation());
                self.stats.encode_failures += 1;
                warn!("Encode failed for frame #{}: {}", frame.sequence, e);
                return;
            }
        };

        if units.is_empty() {
            debug!("No units for frame #{}", frame.sequence);
            return;
        }

        for unit in units {
            self.stats.frames_encoded += 1;
            let packets = fragment(&unit.data, self.max_packet_size);
            let last = packets.len().saturating_sub(1);
            debug!(
                "Unit #{}: {} bytes -> {} packets{}",
                unit.sequence,
                unit.len(),
                packets.len(),
                if unit.likely_keyframe() { " (keyframe)" } else { "" }
            );

            for (index, packet) in packets.into_iter().enumerate() {
                // Never send once the session has failed or closed
                if self.session.is_terminated() {
                    return;
                }

                let len = packet.len() as u64;
                match self.sink.send_packet(packet, index == last).await {
                    Ok(()) => {
                        self.stats.packets_sent += 1;
                        self.stats.bytes_sent += len;
                    }
                    Err(e) => {
                        debug_assert!(!e.is_fatal_to_negotiation());
                        self.stats.send_failures += 1;
                        debug!("Send failed: {}", e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use crate::video::encoder::adapter::tests::ScriptedEncoder;
    use crate::video::format::Resolution;
    use crate::video::source::SolidColorSource;
    use crate::webrtc::session::tests::{session_with, MockSignaling, MockTransport};
    use crate::webrtc::session::{ConnectionState, IceGatheringState};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        packets: Mutex<Vec<(usize, bool)>>,
    }

    impl RecordingSink {
        fn sizes(&self) -> Vec<usize> {
            self.packets.lock().iter().map(|(len, _)| *len).collect()
        }

        fn markers(&self) -> Vec<bool> {
            self.packets.lock().iter().map(|(_, marker)| *marker).collect()
        }
    }

    #[async_trait]
    impl PacketSink for RecordingSink {
        async fn send_packet(&self, payload: Bytes, end_of_frame: bool) -> Result<()> {
            self.packets.lock().push((payload.len(), end_of_frame));
            Ok(())
        }
    }

    async fn connected_session() -> Arc<Session> {
        let session = session_with(MockTransport::new(Some("S1")), MockSignaling::answering("S2"));
        session.start().await.unwrap();
        session.on_gathering_state(IceGatheringState::Complete).await;
        session.on_connection_state(ConnectionState::Connected).await;
        session
    }

    fn build_loop(
        session: Arc<Session>,
        script: Vec<Result<Vec<usize>>>,
        sink: Arc<RecordingSink>,
    ) -> MediaSendLoop {
        MediaSendLoop::new(
            session,
            Box::new(SolidColorSource::green(Resolution::new(4, 4))),
            EncoderAdapter::new(Box::new(ScriptedEncoder::new(script)), 500),
            sink,
            1200,
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn test_large_unit_is_fragmented_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let mut send_loop = build_loop(connected_session().await, vec![Ok(vec![3000])], sink.clone());

        send_loop.tick().await;

        assert_eq!(sink.sizes(), vec![1200, 1200, 600]);
        assert_eq!(sink.markers(), vec![false, false, true]);
        assert_eq!(send_loop.stats().bytes_sent, 3000);
    }

    #[tokio::test]
    async fn test_undersized_unit_sends_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let mut send_loop = build_loop(connected_session().await, vec![Ok(vec![200])], sink.clone());

        send_loop.tick().await;

        assert!(sink.sizes().is_empty());
        assert_eq!(send_loop.stats().units_dropped, 1);
        assert_eq!(send_loop.stats().frames_encoded, 0);
    }

    #[tokio::test]
    async fn test_encode_failure_skips_tick() {
        let sink = Arc::new(RecordingSink::default());
        let script = vec![
            Err(AppError::EncodeFailure("boom".to_string())),
            Ok(vec![800]),
        ];
        let mut send_loop = build_loop(connected_session().await, script, sink.clone());

        send_loop.tick().await;
        assert!(sink.sizes().is_empty());

        send_loop.tick().await;
        assert_eq!(sink.sizes(), vec![800]);
        assert_eq!(send_loop.stats().encode_failures, 1);
    }

    #[tokio::test]
    async fn test_failed_negotiation_sends_nothing() {
        let session = session_with(MockTransport::new(Some("S1")), MockSignaling::failing("500"));
        session.start().await.unwrap();
        session.on_gathering_state(IceGatheringState::Complete).await;
        session.on_connection_state(ConnectionState::Connected).await;
        assert_eq!(session.connection_state(), ConnectionState::Failed);

        let sink = Arc::new(RecordingSink::default());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let stats = build_loop(session, vec![Ok(vec![3000])], sink.clone())
            .run(shutdown_rx)
            .await;

        assert_eq!(stats.packets_sent, 0);
        assert!(sink.sizes().is_empty());
    }

    #[tokio::test]
    async fn test_idle_until_connected_then_stops_on_close() {
        let session = session_with(MockTransport::new(Some("S1")), MockSignaling::answering("S2"));
        session.start().await.unwrap();

        let sink = Arc::new(RecordingSink::default());
        let script = (0..1000).map(|_| Ok(vec![600])).collect();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(build_loop(session.clone(), script, sink.clone()).run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(sink.sizes().is_empty());

        session.on_connection_state(ConnectionState::Connected).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sink.sizes().is_empty());

        session.close().await.unwrap();
        let stats = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(stats.idle_ticks > 0);
        assert_eq!(stats.packets_sent as usize, sink.sizes().len());
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let sink = Arc::new(RecordingSink::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(build_loop(connected_session().await, vec![], sink).run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(()).unwrap();

        let stats = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(stats.ticks > 0);
    }
}
