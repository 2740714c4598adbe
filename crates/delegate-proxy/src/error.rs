//! Error types for the forwarding engine
//!
//! A call fails in one of two ways: there was nobody to ask
//! ([`ProxyError::NoRemotes`]), or every remote that was asked failed
//! ([`ProxyError::Exhausted`]). The latter keeps the whole attempt history
//! but leads with the last remote's error.

use std::fmt;

use delegate_core::TransportError;
use thiserror::Error;

use crate::protocol::FramingError;

/// Coarse classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Nothing to try (empty pool) or an unusable message
    Configuration,
    /// The host could not reach the remote
    Connection,
    /// Stream could not be opened, or I/O failed on it
    Stream,
    /// Reply absent, oversized or malformed
    Protocol,
    /// The caller's context was cancelled or ran out of time
    Cancelled,
}

/// Why a single attempt against one remote failed
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("Connection error: {0}")]
    Connection(#[source] TransportError),

    #[error("Stream error: {0}")]
    Stream(#[source] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[source] FramingError),

    #[error("No response to request")]
    NoResponse,

    #[error("Cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl AttemptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttemptError::Connection(_) => ErrorKind::Connection,
            AttemptError::Stream(_) => ErrorKind::Stream,
            AttemptError::Protocol(_) | AttemptError::NoResponse => ErrorKind::Protocol,
            AttemptError::Cancelled | AttemptError::DeadlineExceeded => ErrorKind::Cancelled,
        }
    }
}

impl From<FramingError> for AttemptError {
    fn from(e: FramingError) -> Self {
        match e {
            FramingError::Io(io) => AttemptError::Stream(TransportError::Io(io)),
            FramingError::Empty => AttemptError::NoResponse,
            other => AttemptError::Protocol(other),
        }
    }
}

impl From<std::io::Error> for AttemptError {
    fn from(e: std::io::Error) -> Self {
        AttemptError::Stream(TransportError::Io(e))
    }
}

/// One failed attempt, tagged with the remote it was made against
#[derive(Debug)]
pub struct FailedAttempt {
    /// Full form of the remote's identity
    pub remote: String,
    pub error: AttemptError,
}

impl fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.remote, self.error)
    }
}

/// Every remote in the traversal failed
#[derive(Debug)]
pub struct ExhaustedError {
    earlier: Vec<FailedAttempt>,
    last: FailedAttempt,
}

impl ExhaustedError {
    pub(crate) fn new(earlier: Vec<FailedAttempt>, last: FailedAttempt) -> Self {
        Self { earlier, last }
    }

    /// The attempt made last in traversal order
    pub fn last(&self) -> &FailedAttempt {
        &self.last
    }

    pub fn last_error(&self) -> &AttemptError {
        &self.last.error
    }

    /// All attempts, in the order they were made
    pub fn attempts(&self) -> impl Iterator<Item = &FailedAttempt> {
        self.earlier.iter().chain(std::iter::once(&self.last))
    }

    /// Number of attempts made
    pub fn len(&self) -> usize {
        self.earlier.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for ExhaustedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} attempt", self.last, self.len())?;
        if self.len() > 1 {
            f.write_str("s")?;
        }
        f.write_str(")")
    }
}

impl std::error::Error for ExhaustedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last.error)
    }
}

/// Error returned by a forwarding call
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The remote pool is empty; nothing was attempted
    #[error("No remotes configured")]
    NoRemotes,

    /// The outgoing message could not be encoded; nothing was attempted
    #[error("Cannot encode message: {0}")]
    Encode(#[source] FramingError),

    #[error("{0}")]
    Exhausted(#[from] ExhaustedError),
}

impl ProxyError {
    pub fn is_no_remotes(&self) -> bool {
        matches!(self, ProxyError::NoRemotes)
    }

    /// The error from the last attempted remote, if any remote was attempted
    pub fn last_error(&self) -> Option<&AttemptError> {
        match self {
            ProxyError::Exhausted(e) => Some(e.last_error()),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::NoRemotes | ProxyError::Encode(_) => ErrorKind::Configuration,
            ProxyError::Exhausted(e) => e.last_error().kind(),
        }
    }
}

/// Result type alias for forwarding calls
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(remote: &str, error: AttemptError) -> FailedAttempt {
        FailedAttempt {
            remote: remote.to_string(),
            error,
        }
    }

    #[test]
    fn test_framing_error_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(
            AttemptError::from(FramingError::Io(io)).kind(),
            ErrorKind::Stream
        );
        assert!(matches!(
            AttemptError::from(FramingError::Empty),
            AttemptError::NoResponse
        ));
        assert_eq!(
            AttemptError::from(FramingError::MessageTooLarge { size: 10, max: 5 }).kind(),
            ErrorKind::Protocol
        );
    }

    #[test]
    fn test_exhausted_leads_with_last() {
        let err = ExhaustedError::new(
            vec![
                failed(
                    "A",
                    AttemptError::Connection(TransportError::ConnectionFailed("refused".into())),
                ),
                failed("B", AttemptError::NoResponse),
            ],
            failed("C", AttemptError::DeadlineExceeded),
        );

        assert_eq!(err.len(), 3);
        assert_eq!(err.last().remote, "C");
        let order: Vec<_> = err.attempts().map(|a| a.remote.as_str()).collect();
        assert_eq!(order, ["A", "B", "C"]);

        let msg = err.to_string();
        assert!(msg.starts_with("C: Deadline exceeded"));
        assert!(msg.contains("3 attempts"));
    }

    #[test]
    fn test_proxy_error_helpers() {
        assert!(ProxyError::NoRemotes.is_no_remotes());
        assert!(ProxyError::NoRemotes.last_error().is_none());
        assert_eq!(ProxyError::NoRemotes.kind(), ErrorKind::Configuration);

        let err: ProxyError =
            ExhaustedError::new(Vec::new(), failed("A", AttemptError::NoResponse)).into();
        assert!(!err.is_no_remotes());
        assert!(matches!(err.last_error(), Some(AttemptError::NoResponse)));
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.to_string(), "A: No response to request (after 1 attempt)");
    }
}
