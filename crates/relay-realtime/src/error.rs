//! Error types for the real-time core.

use thiserror::Error;

/// Errors that can occur in real-time operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The peer closed the connection cleanly.
    #[error("connection closed by peer")]
    Disconnected,

    /// An inbound message could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The outbound channel of a connection is closed.
    #[error("channel closed")]
    ChannelClosed,

    /// The outbound queue of a connection is full.
    #[error("outbound queue full")]
    QueueFull,

    /// A send did not complete within the configured timeout.
    #[error("send timed out after {0:?}")]
    SendTimeout(std::time::Duration),

    /// The hub refused a new connection.
    #[error("connection limit reached: max {0} connections")]
    ConnectionLimit(usize),

    /// The connection already belongs to a registered client.
    #[error("connection already registered as client {0}")]
    AlreadyRegistered(String),

    /// A handler declared a parameter the dispatcher cannot supply.
    #[error("unknown handler parameter: {0} (expected payload, connection or identity)")]
    UnknownParameter(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RealtimeError {
    /// Whether this error means the session is over rather than a single message being bad.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RealtimeError::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(!RealtimeError::Protocol("bad".into()).is_terminal());
        assert!(RealtimeError::Disconnected.is_terminal());
        assert!(RealtimeError::Transport("reset".into()).is_terminal());
        assert!(!RealtimeError::QueueFull.to_string().is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = RealtimeError::UnknownParameter("request".into());
        assert!(err.to_string().contains("request"));

        let err = RealtimeError::ConnectionLimit(3);
        assert_eq!(err.to_string(), "connection limit reached: max 3 connections");
    }
}
