//! Session I/O loops
//!
//! The read loop forwards client lines to the router; the write loop drains
//! a session's outbound queue onto the socket. They run on separate tasks so
//! a slow reader never stalls delivery from the router.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::ClientSession;
use crate::connection::{ConnectionReader, ConnectionWriter};
use crate::error::ConnectionError;
use crate::router::RouterHandle;
use crate::types::SessionId;

/// Why a session's read loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    /// The session was closed from outside; normal termination
    Cancelled,
    /// Peer hung up or the read side failed
    EndOfStream,
    /// The writer task ended first (write failure)
    WriteFailed,
    /// The router is gone
    RouterClosed,
}

/// Read lines until end-of-stream or cancellation
///
/// Blank lines are skipped; overlong lines are logged and dropped. Any other
/// read error counts as a disconnect.
pub(crate) async fn read_loop(
    session: &ClientSession,
    mut reader: ConnectionReader,
    router: &RouterHandle,
) -> ReadOutcome {
    let id = session.id();

    loop {
        let result = tokio::select! {
            biased;
            _ = session.closed() => {
                debug!("Read loop for {} interrupted", id);
                return ReadOutcome::Cancelled;
            }
            result = reader.read_line() => result,
        };

        match result {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                debug!("Session {} received: {}", id, line);
                if router.received(id, line).await.is_err() {
                    return ReadOutcome::RouterClosed;
                }
            }
            Ok(None) => {
                debug!("Session {} reached end of stream", id);
                return ReadOutcome::EndOfStream;
            }
            Err(ConnectionError::LineTooLong) => {
                warn!("Session {} sent an overlong line, discarded", id);
            }
            Err(e) => {
                debug!("Read error on session {}: {}", id, e);
                return ReadOutcome::EndOfStream;
            }
        }
    }
}

/// Write queued lines in order until the queue closes or a write fails
///
/// Shuts the write direction down on exit.
pub(crate) async fn write_loop(
    id: SessionId,
    mut outbound: mpsc::Receiver<String>,
    mut writer: ConnectionWriter,
) {
    while let Some(line) = outbound.recv().await {
        if let Err(e) = writer.write_line(&line).await {
            debug!("Write to session {} failed: {}", id, e);
            break;
        }
    }

    writer.close().await;
    debug!("Write loop ended for {}", id);
}
