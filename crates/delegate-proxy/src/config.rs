//! Configuration for the forwarding engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{DEFAULT_MAX_MESSAGE_SIZE, PROTOCOL_ID};

/// Configuration for a [`StandardProxy`](crate::StandardProxy)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Protocol identifier streams are opened with
    pub protocol: String,
    /// Largest frame payload written or accepted, in bytes
    pub max_message_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            protocol: PROTOCOL_ID.to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ProxyConfig {
    /// Set the protocol identifier
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Set the maximum frame payload size
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Reject settings no stream could work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.protocol.starts_with('/') || self.protocol.len() < 2 {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::ZeroMessageSize);
        }
        Ok(())
    }
}

/// Invalid proxy configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Protocol identifier must be a non-empty path like /name/1.0.0, got {0:?}")]
    InvalidProtocol(String),

    #[error("Maximum message size must be greater than zero")]
    ZeroMessageSize,
}
