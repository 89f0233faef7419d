//! Video frames, encoding and decoding
//!
//! Raw frames come from a [`FrameSource`], are encoded to H.264 by an
//! [`Encoder`] behind the [`EncoderAdapter`] policy, and inbound units are
//! handed to a [`Decoder`].

pub mod decoder;
pub mod encoder;
pub mod format;
pub mod frame;
pub mod source;

pub use decoder::{AnnexBDecoder, Decoder};
pub use encoder::{EncodedFrame, Encoder, EncoderAdapter, EncoderConfig, FfmpegEncoder};
pub use format::{PixelFormat, Resolution};
pub use frame::VideoFrame;
pub use source::{FrameSource, SolidColorSource};
