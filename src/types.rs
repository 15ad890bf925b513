//! Basic type definitions for the chat relay
//!
//! Provides:
//! - `SessionId`: UUID-based opaque session handle
//! - `SessionState`: lifecycle of a connected client session

use uuid::Uuid;

/// Unique session identifier (newtype pattern)
///
/// Wraps a UUID v4, so a handle is never reused after its session is removed.
/// Implements Hash and Eq for use as map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a client session
///
/// `Connecting → Active → Closing → Closed`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, output stream not yet set up
    Connecting,
    /// Read/relay loop running
    Active,
    /// Teardown started (shutdown requested or stream ended)
    Closing,
    /// Resources released
    Closed,
}

impl SessionState {
    /// Whether the session has started tearing down
    pub fn is_terminating(self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}
