//! Client session
//!
//! Bridges one connection to the router. A session owns its connection
//! exclusively: the read half is driven by [`ClientSession::run`] on the
//! session's own task, the write half by a dedicated writer task fed through
//! a bounded per-session queue, so writes from any task stay in FIFO order
//! and never interleave.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::connection::{Connection, ConnectionReader, ConnectionWriter};
use crate::error::SendError;
use crate::handler::{self, ReadOutcome};
use crate::message::{EXIT_DIRECTIVE, FAREWELL_NOTICE};
use crate::router::RouterHandle;
use crate::types::{SessionId, SessionState};

/// Server-side representation of one connected client
pub struct ClientSession {
    id: SessionId,
    peer: Option<SocketAddr>,
    config: SessionConfig,
    /// Interrupts the read loop when the session is closed from outside
    cancel: CancellationToken,
    inner: Mutex<Inner>,
}

struct Inner {
    state: SessionState,
    /// Present until `run` takes it (or `close` drops it)
    connection: Option<Connection>,
    /// Present while the writer task is accepting lines
    outbound: Option<mpsc::Sender<String>>,
}

impl ClientSession {
    /// Create a session in the `Connecting` state
    pub fn new(connection: Connection, config: SessionConfig) -> Self {
        Self {
            id: SessionId::new(),
            peer: connection.peer_addr(),
            config,
            cancel: CancellationToken::new(),
            inner: Mutex::new(Inner {
                state: SessionState::Connecting,
                connection: Some(connection),
                outbound: None,
            }),
        }
    }

    /// Unique session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Remote address of the client, if known
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Resolves once the session has been closed
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Run the session until end-of-stream or shutdown
    ///
    /// Every non-empty line goes to the router. When the stream ends on its
    /// own (peer hang-up, I/O error, writer failure) the session asks the
    /// router to remove it, so no registry entry is left behind.
    pub async fn run(self: Arc<Self>, router: RouterHandle) {
        let Some((reader, outbound, writer)) = self.start() else {
            debug!("Session {} not started: state is {}", self.id, self.state());
            return;
        };
        info!("Session {} active (peer: {:?})", self.id, self.peer);

        let mut write_task = tokio::spawn(handler::write_loop(self.id, outbound, writer));
        let mut write_done = false;

        let outcome = tokio::select! {
            outcome = handler::read_loop(&self, reader, &router) => outcome,
            _ = &mut write_task => {
                write_done = true;
                ReadOutcome::WriteFailed
            }
        };

        match outcome {
            ReadOutcome::Cancelled => {
                debug!("Session {} closed by the server", self.id);
            }
            ReadOutcome::EndOfStream | ReadOutcome::WriteFailed => {
                self.begin_closing();
                if router.remove_client(self.id).await.is_err() {
                    debug!("Router gone while removing session {}", self.id);
                }
            }
            ReadOutcome::RouterClosed => {
                debug!("Router gone, closing session {}", self.id);
            }
        }

        self.close();

        if !write_done {
            // Let the writer flush whatever was queued before the close
            match tokio::time::timeout(self.config.send_timeout, &mut write_task).await {
                Ok(Err(e)) if e.is_panic() => warn!("Writer for session {} panicked", self.id),
                Ok(_) => {}
                Err(_) => {
                    debug!("Writer for session {} did not drain in time", self.id);
                    write_task.abort();
                }
            }
        }

        info!("Session {} finished", self.id);
    }

    /// Move from `Connecting` to `Active`, handing out the I/O halves
    fn start(&self) -> Option<(ConnectionReader, mpsc::Receiver<String>, ConnectionWriter)> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Connecting {
            return None;
        }
        let connection = inner.connection.take()?;
        let (tx, rx) = mpsc::channel(self.config.outbound_capacity);
        inner.outbound = Some(tx);
        inner.state = SessionState::Active;

        let (reader, writer) = connection.into_split();
        Some((reader, rx, writer))
    }

    /// Mark the read side as finished without closing yet
    fn begin_closing(&self) {
        let mut inner = self.inner.lock();
        if !inner.state.is_terminating() {
            inner.state = SessionState::Closing;
        }
    }

    /// Queue a line for this client
    ///
    /// While the session is still connecting the call waits and retries a
    /// bounded number of times, then fails with `SendError::NotReady`.
    pub async fn send(&self, line: impl Into<String>) -> Result<(), SendError> {
        let line = line.into();
        let mut attempts = 0;

        let sender = loop {
            let (state, outbound) = {
                let inner = self.inner.lock();
                (inner.state, inner.outbound.clone())
            };
            match (state, outbound) {
                (SessionState::Active, Some(tx)) => break tx,
                (SessionState::Connecting, _) if attempts < self.config.send_retry_attempts => {
                    attempts += 1;
                    tokio::time::sleep(self.config.send_retry_delay).await;
                }
                (SessionState::Connecting, _) => return Err(SendError::NotReady),
                _ => return Err(SendError::Disconnected),
            }
        };

        self.enqueue(&sender, line).await
    }

    async fn enqueue(&self, sender: &mpsc::Sender<String>, line: String) -> Result<(), SendError> {
        sender
            .send_timeout(line, self.config.send_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => SendError::Timeout,
                SendTimeoutError::Closed(_) => SendError::Disconnected,
            })
    }

    /// Say goodbye and release the connection
    ///
    /// If the read loop is still active, the farewell notice and the
    /// terminating directive are queued before closing. Each is bounded by
    /// `send_timeout`; the directive is skipped if the notice could not be
    /// queued. Idempotent.
    pub async fn shutdown(&self) {
        let farewell = {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Active {
                inner.state = SessionState::Closing;
                inner.outbound.clone()
            } else {
                None
            }
        };

        if let Some(sender) = farewell {
            for line in [FAREWELL_NOTICE, EXIT_DIRECTIVE] {
                if let Err(e) = self.enqueue(&sender, line.to_string()).await {
                    debug!("Could not send '{}' to {}: {}", line, self.id, e);
                    break;
                }
            }
        }

        self.close();
    }

    /// Release the connection without a farewell. Idempotent.
    ///
    /// Interrupts a blocked read and lets the writer drain already queued
    /// lines before it shuts the socket down.
    pub fn close(&self) {
        let (outbound, connection) = {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Closed {
                return;
            }
            inner.state = SessionState::Closed;
            (inner.outbound.take(), inner.connection.take())
        };

        self.cancel.cancel();
        drop(outbound);
        // A session that never ran still holds its whole connection
        drop(connection);

        debug!("Session {} closed", self.id);
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish()
    }
}
