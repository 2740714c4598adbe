//! Host configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Protocol dialed by [`Host::connect`](delegate_core::Host::connect) when no
/// other is configured
pub const DEFAULT_DIAL_PROTOCOL: &str = "/delegate/routing/1.0.0";

/// Configuration for an [`IrohHost`](crate::IrohHost)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Maximum number of pooled connections
    pub max_connections: usize,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// ALPN used when a connection is requested without a protocol
    pub dial_protocol: String,
    /// How long closing a stream waits for the peer to acknowledge what we
    /// sent, in milliseconds
    pub close_timeout_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            connect_timeout_ms: 10_000,
            dial_protocol: DEFAULT_DIAL_PROTOCOL.to_string(),
            close_timeout_ms: 3_000,
        }
    }
}

impl HostConfig {
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    pub fn with_dial_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.dial_protocol = protocol.into();
        self
    }

    pub fn with_close_timeout_ms(mut self, ms: u64) -> Self {
        self.close_timeout_ms = ms;
        self
    }

    pub(crate) fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}
