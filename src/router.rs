//! Router actor implementation
//!
//! The hub of the relay: owns the registry of live sessions, interprets
//! incoming lines, performs broadcast/unicast delivery, and drives shutdown.
//! Uses the Actor pattern: every registry access happens on the router task,
//! and the rest of the server talks to it through a cloneable `RouterHandle`.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::callback::UiCallback;
use crate::client::ClientSession;
use crate::error::RelayError;
use crate::message::{self, Directive, Inbound, EXIT_DIRECTIVE, FAREWELL_NOTICE};
use crate::registry::Registry;
use crate::types::SessionId;

/// Addressee of a unicast
#[derive(Debug, Clone)]
pub enum Recipient {
    /// First session registered under this display name
    Name(String),
    /// This exact session, registered or not
    Session(Arc<ClientSession>),
}

/// Commands sent from handles to the Router actor
#[derive(Debug)]
pub enum RouterCommand {
    /// Add a freshly accepted session; replies with its display name
    Register {
        session: Arc<ClientSession>,
        reply: oneshot::Sender<Result<String, RelayError>>,
    },
    /// A line arrived from a session
    Received {
        session_id: SessionId,
        line: String,
    },
    /// Deliver to every registered session
    Broadcast {
        message: String,
    },
    /// Deliver to one session
    Unicast {
        message: String,
        recipient: Recipient,
    },
    /// Rename a session (subject to the front-end's approval)
    SetName {
        session_id: SessionId,
        name: String,
    },
    /// Remove a session by handle
    Remove {
        session_id: SessionId,
    },
    /// Remove the first session with this display name
    RemoveByName {
        name: String,
    },
    /// Snapshot of `(id, name)` pairs
    Clients {
        reply: oneshot::Sender<Vec<(SessionId, String)>>,
    },
    /// Orderly server shutdown
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// The Router actor
///
/// One instance per server run. Lives until every `RouterHandle` is dropped.
pub struct Router {
    /// Live sessions and their display names, in registration order
    registry: Registry<Arc<ClientSession>>,
    /// Presentation layer
    callback: Arc<dyn UiCallback>,
    /// Command receiver channel
    receiver: mpsc::Receiver<RouterCommand>,
    /// Cancelled once shutdown starts; the listener stops on it
    shutdown: CancellationToken,
    /// Registrations so far, used for default names
    registered: u64,
}

impl Router {
    /// Create a router and the handle used to reach it
    pub fn new(callback: Arc<dyn UiCallback>, capacity: usize) -> (Self, RouterHandle) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let shutdown = CancellationToken::new();
        let router = Self {
            registry: Registry::new(),
            callback,
            receiver,
            shutdown: shutdown.clone(),
            registered: 0,
        };
        (router, RouterHandle { sender, shutdown })
    }

    /// Run the Router event loop
    ///
    /// Processes commands in arrival order until all handles are dropped.
    pub async fn run(mut self) {
        info!("Router started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("Router stopped");
    }

    /// Process a single command
    async fn handle_command(&mut self, cmd: RouterCommand) {
        match cmd {
            RouterCommand::Register { session, reply } => {
                let _ = reply.send(self.register(session));
            }
            RouterCommand::Received { session_id, line } => {
                self.received(session_id, line).await;
            }
            RouterCommand::Broadcast { message } => {
                self.broadcast(message).await;
            }
            RouterCommand::Unicast { message, recipient } => {
                self.unicast(message, recipient).await;
            }
            RouterCommand::SetName { session_id, name } => {
                self.set_name(session_id, name).await;
            }
            RouterCommand::Remove { session_id } => {
                self.remove_client(session_id).await;
            }
            RouterCommand::RemoveByName { name } => {
                self.remove_client_by_name(&name).await;
            }
            RouterCommand::Clients { reply } => {
                let _ = reply.send(self.registry.names());
            }
            RouterCommand::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
            }
        }
    }

    /// Handle new session registration
    fn register(&mut self, session: Arc<ClientSession>) -> Result<String, RelayError> {
        if self.shutdown.is_cancelled() {
            return Err(RelayError::ShuttingDown);
        }

        let id = session.id();
        if let Some(existing) = self.registry.name_of(id) {
            return Ok(existing.to_string());
        }

        self.registered += 1;
        let name = message::default_name(self.registered);
        self.registry.insert(id, session, name.clone());

        info!("Session {} registered as '{}'", id, name);
        debug!("Total sessions: {}", self.registry.len());
        Ok(name)
    }

    /// Handle a line from a session
    async fn received(&mut self, session_id: SessionId, line: String) {
        let Some(sender_name) = self.registry.name_of(session_id).map(str::to_string) else {
            debug!("Dropping line from unregistered session {}", session_id);
            return;
        };

        match Inbound::parse(&line) {
            Inbound::Text(text) => {
                let tagged = message::text_message(&sender_name, &text);
                self.callback.on_message(&tagged);
                self.broadcast(tagged).await;
            }
            Inbound::Directive(Directive::Exit) => {
                self.remove_client(session_id).await;
            }
            Inbound::Directive(Directive::Rename { name }) => {
                self.set_name(session_id, name).await;
            }
            Inbound::Directive(Directive::Private { target, text }) => {
                let private = message::private_message(&sender_name, &text);
                if !self.deliver_to_name(&target, private).await {
                    debug!(
                        "Private message from '{}' to unknown '{}' dropped",
                        sender_name, target
                    );
                }
            }
            Inbound::Directive(Directive::Malformed { keyword }) => {
                debug!("Malformed '{}' directive from '{}' ignored", keyword, sender_name);
            }
            Inbound::Directive(Directive::Unknown { keyword }) => {
                debug!("Unknown directive '{}' from '{}' ignored", keyword, sender_name);
            }
        }
    }

    /// Deliver to every registered session, the sender included
    ///
    /// Works on a snapshot; recipients that fail are removed afterwards so
    /// one broken connection never stops delivery to the rest.
    async fn broadcast(&mut self, message: String) {
        let recipients = self.registry.snapshot();
        let mut failed = Vec::new();

        for (id, session) in recipients {
            if let Err(e) = session.send(message.clone()).await {
                warn!("Broadcast to session {} failed: {}", id, e);
                failed.push(id);
            }
        }

        for id in failed {
            self.remove_client(id).await;
        }
    }

    /// Deliver to one session, by name or by handle
    async fn unicast(&mut self, message: String, recipient: Recipient) {
        match recipient {
            Recipient::Name(name) => {
                if !self.deliver_to_name(&name, message).await {
                    debug!("Unicast to unknown name '{}' dropped", name);
                }
            }
            Recipient::Session(session) => {
                self.deliver(&session, message).await;
            }
        }
    }

    /// Returns false if no session is registered under `name`
    async fn deliver_to_name(&mut self, name: &str, message: String) -> bool {
        let Some(session) = self
            .registry
            .find_by_name(name)
            .map(|(_, entry)| entry.session.clone())
        else {
            return false;
        };
        self.deliver(&session, message).await;
        true
    }

    /// Send to one session; a failure removes it
    async fn deliver(&mut self, session: &Arc<ClientSession>, message: String) {
        if let Err(e) = session.send(message).await {
            warn!("Delivery to session {} failed: {}", session.id(), e);
            self.remove_client(session.id()).await;
        }
    }

    /// Handle a rename request
    ///
    /// The front-end decides the final name; the session is told the result.
    /// Messages already queued keep the old tag.
    async fn set_name(&mut self, session_id: SessionId, requested: String) {
        let Some(old_name) = self.registry.name_of(session_id).map(str::to_string) else {
            debug!("Rename for unregistered session {} ignored", session_id);
            return;
        };

        let final_name = match self.callback.rename_client(&old_name, &requested) {
            Some(name) => name,
            None => {
                debug!("Rename of '{}' to '{}' rejected", old_name, requested);
                old_name.clone()
            }
        };

        self.registry.rename(session_id, final_name.clone());
        info!("Session {} renamed '{}' -> '{}'", session_id, old_name, final_name);

        if let Some(session) = self.registry.get(session_id).map(|e| e.session.clone()) {
            let confirmation = message::name_confirmation(&final_name);
            self.deliver(&session, confirmation).await;
        }
    }

    /// Remove a session, tell the front-end, and shut the session down
    ///
    /// A session that is still reading gets the farewell notice and the
    /// terminating directive first. Unknown handles are a no-op.
    async fn remove_client(&mut self, session_id: SessionId) {
        let Some(entry) = self.registry.remove(session_id) else {
            debug!("Session {} not registered, nothing to remove", session_id);
            return;
        };

        info!("Session {} ('{}') removed", session_id, entry.name);
        debug!("Total sessions: {}", self.registry.len());

        self.callback.on_removed(&entry.name);
        entry.session.shutdown().await;
    }

    /// Remove the first session (in registration order) named `name`
    async fn remove_client_by_name(&mut self, name: &str) {
        match self.registry.find_by_name(name) {
            Some((session_id, _)) => self.remove_client(session_id).await,
            None => debug!("No session named '{}' to remove", name),
        }
    }

    /// Orderly shutdown; a second call is a no-op
    ///
    /// Everyone gets the farewell notice and the terminating directive, then
    /// registrations stop, the listener is told to close, and every
    /// remaining session is closed.
    async fn shutdown(&mut self) {
        if self.shutdown.is_cancelled() {
            debug!("Router already shut down");
            return;
        }

        info!("Router shutting down ({} sessions)", self.registry.len());

        self.broadcast(FAREWELL_NOTICE.to_string()).await;
        self.broadcast(EXIT_DIRECTIVE.to_string()).await;

        self.shutdown.cancel();

        for (session_id, entry) in self.registry.drain() {
            debug!("Closing session {} ('{}')", session_id, entry.name);
            self.callback.on_removed(&entry.name);
            entry.session.close();
        }

        info!("Router shutdown complete");
    }
}

/// Cloneable handle to the Router actor
#[derive(Debug, Clone)]
pub struct RouterHandle {
    sender: mpsc::Sender<RouterCommand>,
    shutdown: CancellationToken,
}

impl RouterHandle {
    async fn send(&self, cmd: RouterCommand) -> Result<(), RelayError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RelayError::RouterClosed)
    }

    /// Register a session; returns its assigned display name
    pub async fn register(&self, session: Arc<ClientSession>) -> Result<String, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(RouterCommand::Register { session, reply }).await?;
        rx.await.map_err(|_| RelayError::RouterClosed)?
    }

    /// Hand a received line to the router
    pub async fn received(&self, session_id: SessionId, line: String) -> Result<(), RelayError> {
        self.send(RouterCommand::Received { session_id, line }).await
    }

    /// Deliver a line to every registered session
    pub async fn broadcast(&self, message: impl Into<String>) -> Result<(), RelayError> {
        self.send(RouterCommand::Broadcast {
            message: message.into(),
        })
        .await
    }

    /// Deliver a line to one session, by name or by handle
    pub async fn unicast(
        &self,
        message: impl Into<String>,
        recipient: Recipient,
    ) -> Result<(), RelayError> {
        self.send(RouterCommand::Unicast {
            message: message.into(),
            recipient,
        })
        .await
    }

    /// Rename a session, subject to the front-end's approval
    pub async fn set_name(
        &self,
        session_id: SessionId,
        name: impl Into<String>,
    ) -> Result<(), RelayError> {
        self.send(RouterCommand::SetName {
            session_id,
            name: name.into(),
        })
        .await
    }

    /// Remove a session and say goodbye to it
    pub async fn remove_client(&self, session_id: SessionId) -> Result<(), RelayError> {
        self.send(RouterCommand::Remove { session_id }).await
    }

    /// Remove the first session registered under `name`
    pub async fn remove_client_by_name(&self, name: impl Into<String>) -> Result<(), RelayError> {
        self.send(RouterCommand::RemoveByName { name: name.into() }).await
    }

    /// Current `(id, name)` pairs in registration order
    ///
    /// Also acts as a barrier: every command sent before it has been handled.
    pub async fn clients(&self) -> Result<Vec<(SessionId, String)>, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(RouterCommand::Clients { reply }).await?;
        rx.await.map_err(|_| RelayError::RouterClosed)
    }

    /// Shut the server down and wait until the router has finished
    ///
    /// Safe to call any number of times.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(RouterCommand::Shutdown { reply }).await.is_err() {
            debug!("Router already gone, nothing to shut down");
            return;
        }
        let _ = rx.await;
    }

    /// Whether shutdown has started
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once shutdown has started
    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await;
    }
}
