//! Error types for the client core

/// Result type alias using the client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in client core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Relay channel send/receive error
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Relay endpoint unreachable after exhausting reconnect attempts
    #[error("Relay unreachable: {0}")]
    Unreachable(String),

    /// Connection attempt exceeded its timeout
    #[error("Operation timeout: {0}")]
    OperationTimeout(String),

    /// A call was requested but no remote peer is present
    #[error("No peer available to call")]
    NoPeerAvailable,

    /// No call session exists for the given peer
    #[error("No call session for peer: {0}")]
    CallSessionNotFound(String),

    /// Camera/microphone acquisition failed, including the audio-only retry
    #[error("Media access denied: {0}")]
    MediaAccessDenied(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// Local media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Media sink rejected a playback operation
    #[error("Playback error: {0}")]
    PlaybackError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ChannelError(_) | Error::OperationTimeout(_) | Error::IoError(_)
        )
    }

    /// Check if this error is a media device/track error
    pub fn is_media_error(&self) -> bool {
        matches!(self, Error::MediaAccessDenied(_) | Error::MediaTrackError(_))
    }

    /// Check if this error is a peer negotiation error
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::PeerConnectionError(_)
                | Error::SdpError(_)
                | Error::IceCandidateError(_)
                | Error::CallSessionNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfig("bad endpoint".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: bad endpoint");

        assert_eq!(
            Error::NoPeerAvailable.to_string(),
            "No peer available to call"
        );
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(Error::ChannelError("drop".to_string()).is_retryable());
        assert!(Error::OperationTimeout("connect".to_string()).is_retryable());
        assert!(!Error::InvalidConfig("x".to_string()).is_retryable());
        assert!(!Error::Unreachable("x".to_string()).is_retryable());
    }

    #[test]
    fn test_error_is_media_error() {
        assert!(Error::MediaAccessDenied("denied".to_string()).is_media_error());
        assert!(!Error::SdpError("x".to_string()).is_media_error());
    }

    #[test]
    fn test_error_is_peer_error() {
        assert!(Error::SdpError("x".to_string()).is_peer_error());
        assert!(Error::CallSessionNotFound("peer-b".to_string()).is_peer_error());
        assert!(!Error::NoPeerAvailable.is_peer_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::IoError(_)));
    }
}
