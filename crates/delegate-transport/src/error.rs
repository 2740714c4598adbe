//! Transport layer error types

use delegate_core::TransportError;
use thiserror::Error;

/// Errors raised by [`IrohHost`](crate::IrohHost) outside the `Host` trait
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Failed to bind endpoint: {0}")]
    Bind(String),

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Too many connections: {current}/{max}")]
    TooManyConnections { current: usize, max: usize },

    #[error("Timeout after {0}ms waiting for connection")]
    Timeout(u64),

    #[error("Failed to open stream: {0}")]
    OpenStream(String),

    #[error("Host is shut down")]
    Shutdown,
}

impl From<HostError> for TransportError {
    fn from(e: HostError) -> Self {
        match e {
            HostError::Timeout(ms) => TransportError::Timeout(ms),
            HostError::OpenStream(msg) => TransportError::StreamFailed(msg),
            HostError::Shutdown => TransportError::ConnectionClosed,
            other => TransportError::ConnectionFailed(other.to_string()),
        }
    }
}
