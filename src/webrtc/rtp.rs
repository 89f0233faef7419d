//! RTP send primitive
//!
//! Each packet from the packetizer becomes the payload of exactly one RTP
//! packet. No re-fragmentation happens below this layer.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocalWriter;

use super::track::TrackConfig;
use crate::error::{AppError, Result};

/// Transport send primitive used by the media send loop
#[async_trait]
pub trait PacketSink: Send + Sync {
    /// Send one packet; `end_of_frame` marks the last packet of an access unit
    async fn send_packet(&self, payload: Bytes, end_of_frame: bool) -> Result<()>;
}

/// RTP header sequencing for one outbound stream
#[derive(Debug)]
pub struct RtpSequencer {
    payload_type: u8,
    ssrc: u32,
    clock_rate: u32,
    sequence_number: u16,
    timestamp: u32,
    last_unit_start: Option<Instant>,
    /// Set between the first and last packet of an access unit
    in_unit: bool,
}

impl RtpSequencer {
    pub fn new(payload_type: u8, ssrc: u32, clock_rate: u32) -> Self {
        Self {
            payload_type,
            ssrc,
            clock_rate,
            sequence_number: 0,
            timestamp: 0,
            last_unit_start: None,
            in_unit: false,
        }
    }

    /// Header for the next packet
    ///
    /// The timestamp advances once per access unit by the wall-clock time
    /// since the previous unit (1/30 s for the first, at most 100 ms).
    pub fn next_header(&mut self, marker: bool, now: Instant) -> rtp::header::Header {
        if !self.in_unit {
            let ticks = match self.last_unit_start {
                None => self.clock_rate / 30,
                Some(last) => {
                    let elapsed = now.saturating_duration_since(last).as_nanos();
                    let ticks = elapsed * self.clock_rate as u128 / 1_000_000_000;
                    ticks.clamp(1, (self.clock_rate / 10) as u128) as u32
                }
            };
            self.timestamp = self.timestamp.wrapping_add(ticks);
            self.last_unit_start = Some(now);
            self.in_unit = true;
        }

        let header = rtp::header::Header {
            version: 2,
            marker,
            payload_type: self.payload_type,
            sequence_number: self.sequence_number,
            timestamp: self.timestamp,
            ssrc: self.ssrc,
            ..Default::default()
        };

        self.sequence_number = self.sequence_number.wrapping_add(1);
        if marker {
            self.in_unit = false;
        }
        header
    }
}

/// Writes packets to the local RTP track
pub struct RtpPacketSender {
    track: Arc<TrackLocalStaticRTP>,
    sequencer: Mutex<RtpSequencer>,
}

impl RtpPacketSender {
    pub fn new(track: Arc<TrackLocalStaticRTP>, config: &TrackConfig) -> Self {
        Self {
            track,
            sequencer: Mutex::new(RtpSequencer::new(
                config.payload_type,
                config.ssrc,
                config.clock_rate,
            )),
        }
    }
}

#[async_trait]
impl PacketSink for RtpPacketSender {
    async fn send_packet(&self, payload: Bytes, end_of_frame: bool) -> Result<()> {
        let header = self.sequencer.lock().next_header(end_of_frame, Instant::now());
        trace!(
            "RTP seq={} ts={} marker={} len={}",
            header.sequence_number,
            header.timestamp,
            header.marker,
            payload.len()
        );

        let packet = rtp::packet::Packet { header, payload };
        self.track
            .write_rtp(&packet)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to write RTP: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_header_fields() {
        let mut seq = RtpSequencer::new(96, 42, 90000);
        let header = seq.next_header(true, Instant::now());

        assert_eq!(header.version, 2);
        assert_eq!(header.payload_type, 96);
        assert_eq!(header.ssrc, 42);
        assert_eq!(header.sequence_number, 0);
        assert_eq!(header.timestamp, 3000);
        assert!(header.marker);
    }

    #[test]
    fn test_timestamp_per_access_unit() {
        let mut seq = RtpSequencer::new(96, 42, 90000);
        let t0 = Instant::now();

        let a = seq.next_header(false, t0);
        let b = seq.next_header(false, t0 + Duration::from_millis(5));
        let c = seq.next_header(true, t0 + Duration::from_millis(6));
        assert_eq!(a.timestamp, b.timestamp);
        assert_eq!(b.timestamp, c.timestamp);
        assert_eq!(c.sequence_number, 2);

        // 40 ms later at 90 kHz
        let d = seq.next_header(true, t0 + Duration::from_millis(40));
        assert_eq!(d.timestamp - c.timestamp, 3600);

        // Long gaps are capped at 100 ms
        let e = seq.next_header(true, t0 + Duration::from_secs(10));
        assert_eq!(e.timestamp - d.timestamp, 9000);
    }

    #[test]
    fn test_sequence_wraps() {
        let mut seq = RtpSequencer::new(96, 42, 90000);
        seq.sequence_number = u16::MAX;
        let now = Instant::now();

        assert_eq!(seq.next_header(false, now).sequence_number, u16::MAX);
        assert_eq!(seq.next_header(true, now).sequence_number, 0);
    }
}
