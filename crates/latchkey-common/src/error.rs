//! Error types for Latchkey
//!
//! Record-not-found, record-locked and lock-mismatch are ordinary protocol
//! outcomes and never appear here. Only the conditions below are raised.

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum LatchkeyError {
    /// Malformed or missing connection parameters, detected at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The round trip to the store failed (network, timeout, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The store answered with a shape the protocol did not expect.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl LatchkeyError {
    /// Whether a later attempt may succeed without any change on the caller's side
    pub fn is_transient(&self) -> bool {
        matches!(self, LatchkeyError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, LatchkeyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LatchkeyError::Configuration("host is empty".to_string());
        assert_eq!(err.to_string(), "configuration error: host is empty");

        let err = LatchkeyError::Transport("connection reset".to_string());
        assert_eq!(err.to_string(), "transport error: connection reset");

        let err = LatchkeyError::ProtocolViolation("expected array".to_string());
        assert_eq!(err.to_string(), "protocol violation: expected array");
    }

    #[test]
    fn test_only_transport_is_transient() {
        assert!(LatchkeyError::Transport("timeout".into()).is_transient());
        assert!(!LatchkeyError::Configuration("bad".into()).is_transient());
        assert!(!LatchkeyError::ProtocolViolation("bad".into()).is_transient());
        assert!(!LatchkeyError::Codec("bad".into()).is_transient());
    }
}
