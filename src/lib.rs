//! Line-oriented TCP Chat Relay Library
//!
//! A minimal chat relay: clients connect over TCP, get a display name, and
//! exchange newline-delimited messages that the server relays to everyone
//! (or to one named client).
//!
//! # Features
//! - Task-per-connection sessions with per-session ordered output
//! - Broadcast and directed (private) delivery
//! - Control directives: `!EXIT`, `!RENAME <name>`, `!PRIVATE <name> <text>`
//! - Pluggable front-end through the `UiCallback` trait
//! - Orderly, idempotent shutdown
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Router` is the central actor owning the session registry
//! - Each connection runs a `ClientSession` task that forwards lines to it
//! - Each session has its own writer task fed by a bounded queue
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use chat_relay::{ChatRelay, LoggingCallback, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let relay = ChatRelay::start(ServerConfig::default(), Arc::new(LoggingCallback))
//!         .await
//!         .unwrap();
//!     relay.wait().await.unwrap();
//! }
//! ```

pub mod callback;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
mod handler;
pub mod listener;
pub mod message;
pub mod registry;
pub mod router;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use callback::{LoggingCallback, UiCallback};
pub use client::ClientSession;
pub use config::{ServerConfig, SessionConfig};
pub use connection::Connection;
pub use error::{ConnectionError, RelayError, SendError};
pub use listener::Listener;
pub use message::{Directive, Inbound};
pub use registry::Registry;
pub use router::{Recipient, Router, RouterCommand, RouterHandle};
pub use server::ChatRelay;
pub use types::{SessionId, SessionState};
