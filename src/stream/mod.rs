//! Outbound media streaming

pub mod media_loop;

pub use media_loop::{MediaSendLoop, SendLoopStats};
