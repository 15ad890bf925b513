//! Chat Relay - Entry Point
//!
//! Loads configuration, starts the relay, and shuts it down on Ctrl-C.

use std::env;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_relay::{ChatRelay, LoggingCallback, ServerConfig};

/// Environment variable naming an optional JSON config file
const CONFIG_ENV: &str = "RELAY_CONFIG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let mut config = match env::var(CONFIG_ENV) {
        Ok(path) => {
            info!("Loading configuration from {}", path);
            ServerConfig::from_file(&path)?
        }
        Err(_) => ServerConfig::default(),
    };

    // Optional `host:port` argument overrides the configured address
    if let Some(addr) = env::args().nth(1) {
        config = config.with_address(&addr)?;
    }

    let relay = match ChatRelay::start(config, Arc::new(LoggingCallback)).await {
        Ok(relay) => relay,
        Err(e) => {
            error!("Failed to start chat relay: {}", e);
            return Err(e.into());
        }
    };
    info!("Chat relay listening on {}", relay.local_addr());

    let router = relay.router();
    let wait = relay.wait();
    tokio::pin!(wait);

    tokio::select! {
        result = &mut wait => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            router.shutdown().await;
            wait.await?;
        }
    }

    info!("Bye");
    Ok(())
}
