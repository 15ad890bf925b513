//! Connection listener
//!
//! Binds the listening socket, accepts connections, registers a session for
//! each one with the router, and runs it on its own task. Stops when the
//! router starts shutting down; an accept failure is fatal.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::client::ClientSession;
use crate::config::{ServerConfig, SessionConfig};
use crate::connection::Connection;
use crate::error::RelayError;
use crate::router::RouterHandle;

/// Accept loop plus the set of running session tasks
pub struct Listener {
    listener: TcpListener,
    router: RouterHandle,
    config: ServerConfig,
    workers: JoinSet<()>,
}

impl Listener {
    /// Resolve and bind `config.host:config.port` with the configured backlog
    pub async fn bind(config: &ServerConfig, router: RouterHandle) -> Result<Self, RelayError> {
        let bind_err = |source| RelayError::Bind {
            addr: config.bind_address(),
            source,
        };

        let addr = tokio::net::lookup_host((config.host.as_str(), config.port))
            .await
            .map_err(|_| RelayError::Resolve(config.host.clone()))?
            .next()
            .ok_or_else(|| RelayError::Resolve(config.host.clone()))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        let listener = socket.listen(config.backlog).map_err(bind_err)?;

        info!(
            "Listening on {} (backlog {})",
            listener.local_addr()?,
            config.backlog
        );

        Ok(Self {
            listener,
            router,
            config: config.clone(),
            workers: JoinSet::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until shutdown
    ///
    /// On exit the listening socket is closed and session tasks get
    /// `shutdown_grace` to finish before they are aborted.
    pub async fn run(mut self) -> Result<(), RelayError> {
        let session_config = self.config.session();

        let result = loop {
            tokio::select! {
                biased;

                _ = self.router.shutdown_requested() => {
                    info!("Shutdown requested, no longer accepting connections");
                    break Ok(());
                }

                res = self.listener.accept() => match res {
                    Ok((stream, addr)) => self.accept(stream, addr, session_config).await,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        break Err(RelayError::Accept(e));
                    }
                },

                Some(res) = self.workers.join_next() => {
                    if let Err(e) = res {
                        if e.is_panic() {
                            error!("A session task panicked: {e:?}");
                        }
                    }
                }
            }
        };

        let Self {
            listener,
            router,
            config,
            mut workers,
        } = self;
        drop(listener);
        info!("Listening socket closed");

        if result.is_err() {
            // Nothing will accept again; take the sessions down with us
            router.shutdown().await;
        }

        let drained = tokio::time::timeout(config.shutdown_grace(), async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Timed out waiting for session tasks, aborting the rest");
            workers.shutdown().await;
        }
        info!("All session tasks finished");

        result
    }

    /// Register a new connection and start its session task
    async fn accept(&mut self, stream: TcpStream, addr: SocketAddr, config: SessionConfig) {
        info!("New connection from {}", addr);

        let connection = Connection::from_tcp(stream, config.max_line_length);
        let session = Arc::new(ClientSession::new(connection, config));

        match self.router.register(session.clone()).await {
            Ok(name) => {
                debug!("Connection from {} is '{}'", addr, name);
                self.workers.spawn(session.run(self.router.clone()));
            }
            Err(e) => {
                warn!("Rejecting connection from {}: {}", addr, e);
                session.close();
            }
        }
    }
}
