use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Signaling endpoint could not be reached or did not answer with 200 OK
    #[error("Signaling unreachable: {0}")]
    SignalingUnreachable(String),

    /// Signaling response body was not a usable SDP answer
    #[error("Malformed answer: {0}")]
    MalformedAnswer(String),

    #[error("Encode failure: {0}")]
    EncodeFailure(String),

    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    /// Encoder output below the minimum unit size (dropped by policy)
    #[error("Undersized packet: {size} bytes (threshold {threshold})")]
    UndersizedPacket { size: usize, threshold: usize },

    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Video error: {0}")]
    VideoError(String),
}

impl AppError {
    /// Whether this error terminates the negotiation of a session
    ///
    /// Media errors, including failed RTP writes, are contained within a
    /// single tick or frame and never reach the session state machine.
    pub fn is_fatal_to_negotiation(&self) -> bool {
        matches!(
            self,
            AppError::SignalingUnreachable(_) | AppError::MalformedAnswer(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_errors_are_fatal() {
        assert!(AppError::SignalingUnreachable("500".into()).is_fatal_to_negotiation());
        assert!(AppError::MalformedAnswer("no sdp".into()).is_fatal_to_negotiation());
    }

    #[test]
    fn test_media_errors_are_recoverable() {
        assert!(!AppError::EncodeFailure("x".into()).is_fatal_to_negotiation());
        assert!(!AppError::DecodeFailure("x".into()).is_fatal_to_negotiation());
        assert!(!AppError::UndersizedPacket { size: 200, threshold: 500 }.is_fatal_to_negotiation());
        assert!(!AppError::WebRtcError("Failed to write RTP".into()).is_fatal_to_negotiation());
    }

    #[test]
    fn test_undersized_display() {
        let err = AppError::UndersizedPacket { size: 200, threshold: 500 };
        assert_eq!(err.to_string(), "Undersized packet: 200 bytes (threshold 500)");
    }
}
