//! Error types shared across the delegate crates

use thiserror::Error;

/// Errors related to peer identity
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid identity format: {0}")]
    InvalidFormat(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}

/// Errors raised by a [`Host`](crate::Host) or a [`ProtocolStream`](crate::ProtocolStream)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Stream failed: {0}")]
    StreamFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the error means the remote went away mid-exchange
    pub fn is_reset(&self) -> bool {
        match self {
            TransportError::ConnectionClosed => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
