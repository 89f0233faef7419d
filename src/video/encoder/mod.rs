//! H.264 encoding
//!
//! The [`Encoder`] trait is the seam between the send loop and whatever
//! produces Annex-B units. [`EncoderAdapter`] applies the output policy.

pub mod adapter;
pub mod ffmpeg;
pub mod traits;

pub use adapter::{check_unit_size, EncoderAdapter};
pub use ffmpeg::FfmpegEncoder;
pub use traits::{EncodedFrame, Encoder, EncoderConfig, KEYFRAME_SIZE_HINT};
