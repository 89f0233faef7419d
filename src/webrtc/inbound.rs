//! Inbound media: remote RTP track to decoder

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use rtp::codecs::h264::H264Packet;
use rtp::packetizer::Depacketizer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::track::track_remote::TrackRemote;

use crate::video::decoder::Decoder;

/// Counters for the inbound path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboundStats {
    pub frames: u64,
    pub bytes: u64,
    pub decode_failures: u64,
}

/// Receives complete inbound access units and hands them to a decoder
///
/// Decode failures are counted and skipped; they never reach the session.
pub struct InboundFrameSink {
    decoder: Mutex<Box<dyn Decoder>>,
    frames: AtomicU64,
    bytes: AtomicU64,
    decode_failures: AtomicU64,
}

impl InboundFrameSink {
    pub fn new(decoder: Box<dyn Decoder>) -> Arc<Self> {
        Arc::new(Self {
            decoder: Mutex::new(decoder),
            frames: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
        })
    }

    /// Deliver one encoded access unit
    pub fn on_frame(&self, frame: Bytes) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);

        let mut decoder = self.decoder.lock();
        match decoder.decode(&frame) {
            Ok(Some(decoded)) => debug!(
                "{} decoded {} frame #{}",
                decoder.name(),
                decoded.resolution,
                decoded.sequence
            ),
            Ok(None) => {}
            Err(e) => {
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Skipping inbound frame ({} bytes): {}", frame.len(), e);
            }
        }
    }

    pub fn stats(&self) -> InboundStats {
        InboundStats {
            frames: self.frames.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
        }
    }
}

/// Reassembles H.264 access units from RTP payloads
///
/// A unit is complete when a packet with the marker bit arrives.
pub struct AccessUnitAssembler {
    depacketizer: H264Packet,
    buffer: BytesMut,
}

impl AccessUnitAssembler {
    pub fn new() -> Self {
        Self {
            depacketizer: H264Packet::default(),
            buffer: BytesMut::new(),
        }
    }

    /// Feed one RTP payload; returns the access unit when `marker` closes it
    pub fn push(&mut self, payload: &Bytes, marker: bool) -> Option<Bytes> {
        match self.depacketizer.depacketize(payload) {
            Ok(nal) => self.buffer.extend_from_slice(&nal),
            Err(e) => {
                debug!("Dropping RTP payload ({} bytes): {}", payload.len(), e);
            }
        }

        if marker && !self.buffer.is_empty() {
            return Some(self.buffer.split().freeze());
        }
        None
    }
}

impl Default for AccessUnitAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Read RTP from a remote track until it ends, feeding the sink
pub fn spawn_track_reader(track: Arc<TrackRemote>, sink: Arc<InboundFrameSink>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let codec = track.codec();
        info!(
            "Reading remote track {} ({}, ssrc {})",
            track.id(),
            codec.capability.mime_type,
            track.ssrc()
        );

        let mut assembler = AccessUnitAssembler::new();
        loop {
            match track.read_rtp().await {
                Ok((packet, _attributes)) => {
                    if let Some(unit) = assembler.push(&packet.payload, packet.header.marker) {
                        sink.on_frame(unit);
                    }
                }
                Err(e) => {
                    info!("Remote track {} ended: {}", track.id(), e);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::decoder::AnnexBDecoder;

    #[test]
    fn test_sink_counts_and_skips_failures() {
        let sink = InboundFrameSink::new(Box::new(AnnexBDecoder::new()));

        sink.on_frame(Bytes::from_static(&[0, 0, 0, 1, 0x65, 0x88, 0x84]));
        sink.on_frame(Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]));
        sink.on_frame(Bytes::from_static(&[0, 0, 1, 0x41, 0x9a]));

        let stats = sink.stats();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.bytes, 16);
        assert_eq!(stats.decode_failures, 1);
    }

    #[test]
    fn test_assembler_joins_fu_a() {
        let mut assembler = AccessUnitAssembler::new();

        // FU-A start and end fragments of an IDR slice (nal header 0x65)
        let start = Bytes::from_static(&[0x7C, 0x85, 0xAA, 0xBB]);
        let end = Bytes::from_static(&[0x7C, 0x45, 0xCC]);

        assert!(assembler.push(&start, false).is_none());
        let unit = assembler.push(&end, true).unwrap();
        assert_eq!(&unit[..], &[0, 0, 0, 1, 0x65, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_assembler_single_nal_per_marker() {
        let mut assembler = AccessUnitAssembler::new();
        let sps = Bytes::from_static(&[0x67, 0x42, 0xC0]);
        let slice = Bytes::from_static(&[0x65, 0x01]);

        assert!(assembler.push(&sps, false).is_none());
        let unit = assembler.push(&slice, true).unwrap();
        assert_eq!(&unit[..], &[0, 0, 0, 1, 0x67, 0x42, 0xC0, 0, 0, 0, 1, 0x65, 0x01]);

        // Buffer is reset after each unit
        let unit = assembler.push(&slice, true).unwrap();
        assert_eq!(&unit[..], &[0, 0, 0, 1, 0x65, 0x01]);
    }
}
