//! IRC connection error types.

use std::time::Duration;

/// Errors that end a connection attempt or an established session.
///
/// Only [`ConnError::InvalidConfig`] is surfaced to the caller of
/// [`connect`](super::connect); everything else drives the backoff loop.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("Invalid connection config: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Nickname in use: {0}")]
    NicknameInUse(String),

    #[error("Join of {channel} rejected: {reason}")]
    JoinRejected { channel: String, reason: String },

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("No traffic from server for {0:?}")]
    PingTimeout(Duration),
}

/// Errors returned by [`ConnectionHandle::send`](super::ConnectionHandle::send).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The connection is not in the `Ready` state; requeue and wait.
    #[error("connection not ready")]
    NotReady,

    /// The line would break protocol framing. Not retryable.
    #[error("invalid line: {0}")]
    InvalidLine(String),

    /// The write failed; the connection is being re-established.
    #[error("transport error: {0}")]
    Transport(String),

    /// The connection manager has shut down.
    #[error("connection closed")]
    Closed,
}

impl SendError {
    /// Whether the same line may succeed after a reconnect.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady | Self::Transport(_))
    }
}
