//! Annex-B stream inspecting decoder

use tracing::trace;

use super::Decoder;
use crate::error::{AppError, Result};
use crate::video::frame::VideoFrame;

/// H.264 NAL unit types this crate distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// Coded slice of a non-IDR picture
    Slice,
    /// Coded slice of an IDR picture
    Idr,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    Other(u8),
}

impl From<u8> for NalUnitType {
    fn from(header: u8) -> Self {
        match header & 0x1F {
            1 => NalUnitType::Slice,
            5 => NalUnitType::Idr,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::AccessUnitDelimiter,
            t => NalUnitType::Other(t),
        }
    }
}

/// Split an Annex-B byte stream into NAL unit payloads (start codes removed)
pub fn split_nal_units(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;

    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut units = Vec::with_capacity(starts.len());
    for (idx, &start) in starts.iter().enumerate() {
        let mut end = match starts.get(idx + 1) {
            // Next start code begins 3 bytes before its payload
            Some(&next) => next - 3,
            None => data.len(),
        };
        // Trailing zero belongs to a 4-byte start code
        while end > start && data[end - 1] == 0 {
            end -= 1;
        }
        if end > start {
            units.push(&data[start..end]);
        }
    }

    units
}

/// Per-decoder counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub access_units: u64,
    pub idr_slices: u64,
    pub non_idr_slices: u64,
    pub parameter_sets: u64,
}

/// Decoder that validates Annex-B framing and tracks NAL statistics
#[derive(Debug, Default)]
pub struct AnnexBDecoder {
    stats: DecoderStats,
}

impl AnnexBDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }
}

impl Decoder for AnnexBDecoder {
    fn name(&self) -> &str {
        "annexb"
    }

    fn decode(&mut self, data: &[u8]) -> Result<Option<VideoFrame>> {
        let units = split_nal_units(data);
        if units.is_empty() {
            return Err(AppError::DecodeFailure(format!(
                "no NAL unit in {} bytes",
                data.len()
            )));
        }

        for unit in &units {
            match NalUnitType::from(unit[0]) {
                NalUnitType::Idr => self.stats.idr_slices += 1,
                NalUnitType::Slice => self.stats.non_idr_slices += 1,
                NalUnitType::Sps | NalUnitType::Pps => self.stats.parameter_sets += 1,
                _ => {}
            }
        }
        self.stats.access_units += 1;
        trace!("Access unit with {} NAL units", units.len());

        Ok(None)
    }
}
