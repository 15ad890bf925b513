//! Server configuration
//!
//! `ServerConfig` covers the listener (host, port, backlog) and the limits
//! applied to every session. It can be built in code with the `with_*`
//! setters or loaded from JSON; missing fields take their defaults.
//!
//! ```
//! use chat_relay::ServerConfig;
//!
//! let config = ServerConfig::default().with_port(0).with_backlog(16);
//! assert_eq!(config.host, "127.0.0.1");
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Default bind host (loopback)
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default bind port
pub const DEFAULT_PORT: u16 = 5050;

/// Default listen backlog
pub const DEFAULT_BACKLOG: u32 = 5;

/// Listener and session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host name or address to bind
    pub host: String,
    /// Port to bind (0 picks an ephemeral port)
    pub port: u16,
    /// Pending connection queue size
    pub backlog: u32,
    /// Longest accepted inbound line, in bytes
    pub max_line_length: usize,
    /// Router command channel buffer size
    pub command_capacity: usize,
    /// Per-session outbound queue size
    pub outbound_capacity: usize,
    /// How many times `send` waits for a connecting session
    pub send_retry_attempts: u32,
    /// Delay between those attempts, in milliseconds
    pub send_retry_delay_ms: u64,
    /// Longest time a send may wait on a full outbound queue, in milliseconds
    pub send_timeout_ms: u64,
    /// How long shutdown waits for session tasks, in milliseconds
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            max_line_length: 4096,
            command_capacity: 256,
            outbound_capacity: 32,
            send_retry_attempts: 10,
            send_retry_delay_ms: 10,
            send_timeout_ms: 1000,
            shutdown_grace_ms: 2000,
        }
    }
}

impl ServerConfig {
    /// Parse a JSON document; absent fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self, RelayError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Set the bind host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the bind port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the listen backlog
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Set the `send` retry budget for connecting sessions
    pub fn with_send_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.send_retry_attempts = attempts;
        self.send_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Override host and port from a `host:port` string
    pub fn with_address(self, addr: &str) -> Result<Self, RelayError> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| RelayError::InvalidAddress(addr.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| RelayError::InvalidAddress(addr.to_string()))?;
        if host.is_empty() {
            return Err(RelayError::InvalidAddress(addr.to_string()));
        }
        let host = host.trim_start_matches('[').trim_end_matches(']');
        Ok(self.with_host(host).with_port(port))
    }

    /// `host:port` as passed to the resolver
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Settings handed to each accepted session
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            max_line_length: self.max_line_length,
            outbound_capacity: self.outbound_capacity.max(1),
            send_retry_attempts: self.send_retry_attempts,
            send_retry_delay: Duration::from_millis(self.send_retry_delay_ms),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
        }
    }
}

/// Per-session limits derived from `ServerConfig`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub max_line_length: usize,
    pub outbound_capacity: usize,
    pub send_retry_attempts: u32,
    pub send_retry_delay: Duration,
    pub send_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        ServerConfig::default().session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5050);
        assert_eq!(config.backlog, 5);
        assert_eq!(config.bind_address(), "127.0.0.1:5050");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ServerConfig::from_json_str(r#"{"port": 6000, "backlog": 64}"#).unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.backlog, 64);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.send_retry_attempts, 10);
    }

    #[test]
    fn test_invalid_json() {
        let result = ServerConfig::from_json_str(r#"{"port": "not a number"}"#);
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_with_address() {
        let config = ServerConfig::default().with_address("0.0.0.0:7000").unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 7000);

        let config = ServerConfig::default().with_address("[::1]:7001").unwrap();
        assert_eq!(config.host, "::1");

        assert!(ServerConfig::default().with_address("nohost").is_err());
        assert!(ServerConfig::default().with_address(":80").is_err());
        assert!(ServerConfig::default().with_address("host:port").is_err());
    }

    #[test]
    fn test_builders() {
        let config = ServerConfig::default()
            .with_host("localhost")
            .with_port(0)
            .with_backlog(16);
        assert_eq!(config.bind_address(), "localhost:0");
        assert_eq!(config.backlog, 16);
    }

    #[test]
    fn test_session_config() {
        let config = ServerConfig::default().with_send_retry(3, Duration::from_millis(5));
        let session = config.session();
        assert_eq!(session.send_retry_attempts, 3);
        assert_eq!(session.send_retry_delay, Duration::from_millis(5));
        assert_eq!(session.send_timeout, Duration::from_secs(1));
    }
}
