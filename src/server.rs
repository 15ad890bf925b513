//! Server entry point
//!
//! `ChatRelay` wires a `Router` and a `Listener` together and runs both on
//! the current tokio runtime.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::callback::UiCallback;
use crate::config::ServerConfig;
use crate::error::RelayError;
use crate::listener::Listener;
use crate::router::{Router, RouterHandle};

/// A running relay
pub struct ChatRelay {
    router: RouterHandle,
    local_addr: SocketAddr,
    listener_task: JoinHandle<Result<(), RelayError>>,
}

impl ChatRelay {
    /// Bind the listener and start accepting
    ///
    /// Bind failures are returned here; nothing keeps running in that case.
    pub async fn start(
        config: ServerConfig,
        callback: Arc<dyn UiCallback>,
    ) -> Result<Self, RelayError> {
        let (router, handle) = Router::new(callback, config.command_capacity);
        let listener = Listener::bind(&config, handle.clone()).await?;
        let local_addr = listener.local_addr()?;

        tokio::spawn(router.run());
        let listener_task = tokio::spawn(listener.run());

        info!("Chat relay started on {}", local_addr);
        Ok(Self {
            router: handle,
            local_addr,
            listener_task,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for broadcasting, kicking or querying clients
    pub fn router(&self) -> RouterHandle {
        self.router.clone()
    }

    /// Orderly shutdown; safe to call more than once
    pub async fn shutdown(&self) {
        self.router.shutdown().await;
    }

    /// Wait for the listener to stop
    ///
    /// Returns the accept loop's fatal error, if it had one.
    pub async fn wait(self) -> Result<(), RelayError> {
        let result = self.listener_task.await?;
        info!("Chat relay on {} stopped", self.local_addr);
        result
    }
}
