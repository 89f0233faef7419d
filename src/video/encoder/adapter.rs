//! Encoder adapter with the undersized-unit filter
//!
//! Units below the minimum size are encoder artifacts rather than picture
//! data. They are dropped here and never reach the packetizer.

use tracing::{debug, trace};

use super::traits::{EncodedFrame, Encoder};
use crate::error::{AppError, Result};
use crate::video::frame::VideoFrame;

/// Reject a unit shorter than `threshold`
pub fn check_unit_size(size: usize, threshold: usize) -> Result<()> {
    if size < threshold {
        return Err(AppError::UndersizedPacket { size, threshold });
    }
    Ok(())
}

/// Wraps an [`Encoder`] and applies the output policy
pub struct EncoderAdapter {
    inner: Box<dyn Encoder>,
    min_unit_size: usize,
    sequence: u64,
    units_dropped: u64,
}

impl EncoderAdapter {
    pub fn new(inner: Box<dyn Encoder>, min_unit_size: usize) -> Self {
        Self {
            inner,
            min_unit_size,
            sequence: 0,
            units_dropped: 0,
        }
    }

    /// Encode one raw frame, returning only units that pass the size filter
    pub async fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<EncodedFrame>> {
        let units = self.inner.encode(frame).await?;
        let mut frames = Vec::with_capacity(units.len());

        for unit in units {
            if let Err(e) = check_unit_size(unit.len(), self.min_unit_size) {
                debug!("{}: dropping unit ({})", self.inner.name(), e);
                self.units_dropped += 1;
                continue;
            }

            self.sequence += 1;
            trace!("Encoded unit #{}: {} bytes", self.sequence, unit.len());
            frames.push(EncodedFrame::new(unit, self.sequence));
        }

        Ok(frames)
    }

    /// Total units dropped by the size filter
    pub fn units_dropped(&self) -> u64 {
        self.units_dropped
    }

    pub fn encoder_name(&self) -> &str {
        self.inner.name()
    }
}
