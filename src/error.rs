//! Error types for the chat relay
//!
//! Defines server-level errors, connection I/O errors and per-session
//! delivery errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Server-level errors
///
/// Bind and accept failures are fatal to the listener and are reported to
/// the caller. Everything session-scoped is handled locally.
#[derive(Debug, Error)]
pub enum RelayError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Could not bind the listening socket (fatal)
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Host name did not resolve to any address
    #[error("Could not resolve host: {0}")]
    Resolve(String),

    /// Accept loop I/O failure (fatal)
    #[error("Accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// Configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Bind address argument is not `host:port`
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Router actor is gone (internal channel broken)
    #[error("Router closed")]
    RouterClosed,

    /// Router no longer accepts registrations
    #[error("Server is shutting down")]
    ShuttingDown,

    /// A server task panicked or was cancelled
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Line I/O errors on a single connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Underlying transport failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer sent a line longer than the configured maximum
    #[error("Line exceeds maximum length")]
    LineTooLong,

    /// Connection was already closed locally
    #[error("Connection closed")]
    Closed,
}

impl From<LinesCodecError> for ConnectionError {
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => ConnectionError::LineTooLong,
            LinesCodecError::Io(e) => ConnectionError::Io(e),
        }
    }
}

/// Message delivery errors
///
/// Any of these means the recipient is treated as disconnected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// Output stream never finished setting up within the retry budget
    #[error("Session output not ready")]
    NotReady,

    /// Session is closing/closed or its writer has gone away
    #[error("Session disconnected")]
    Disconnected,

    /// Outbound queue stayed full for the whole send timeout
    #[error("Send timed out")]
    Timeout,
}
