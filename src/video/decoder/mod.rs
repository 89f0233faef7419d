//! Video decoder implementations
//!
//! Inbound H.264 access units are handed to a [`Decoder`]. Pixel output is
//! optional; a decoder may only validate and account for the stream.

pub mod annexb;

pub use annexb::{AnnexBDecoder, DecoderStats, NalUnitType};

use crate::error::Result;
use crate::video::frame::VideoFrame;

/// Decode capability
pub trait Decoder: Send {
    /// Get decoder name
    fn name(&self) -> &str;

    /// Decode one access unit
    ///
    /// Returns `Ok(None)` when the unit was accepted but produced no picture.
    fn decode(&mut self, data: &[u8]) -> Result<Option<VideoFrame>>;
}
