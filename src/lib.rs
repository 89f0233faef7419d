//! ai-stream-client - real-time WebRTC client for remote AI video processing
//!
//! Streams H.264 video to a remote processing peer over a single WebRTC
//! connection negotiated through one HTTP offer/answer exchange, and hands
//! video coming back from the peer to a decoder.

pub mod config;
pub mod error;
pub mod events;
pub mod stream;
pub mod video;
pub mod webrtc;

pub use error::{AppError, Result};
