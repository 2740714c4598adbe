//! Caller-supplied cancellation and deadline
//!
//! Every blocking step of an attempt (connect, open, write, read) is raced
//! against the [`CallContext`]. When the context fires, the step's future is
//! dropped and the attempt fails; the engine still closes any stream it had
//! opened. The engine never splits a deadline across remotes: a caller that
//! wants an overall budget sets one deadline for the whole call.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::AttemptError;

/// Cancellation scope for one forwarding call
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that never expires unless cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A context cancelled through an existing token
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Tighten the deadline to at most `timeout` from now
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let at = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(at),
            None => at,
        });
        self
    }

    /// A context cancelled along with this one, which can also be cancelled alone
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if there is one
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Cancelled or past the deadline
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// Fail fast if the context has already fired
    pub fn check(&self) -> Result<(), AttemptError> {
        if self.is_cancelled() {
            Err(AttemptError::Cancelled)
        } else if self.is_expired() {
            Err(AttemptError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Drive `fut` unless the context fires first
    ///
    /// Output that is ready wins over a context that fires on the same poll.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, AttemptError>
    where
        F: Future,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            output = fut => Ok(output),
            _ = self.token.cancelled() => Err(AttemptError::Cancelled),
            _ = deadline => Err(AttemptError::DeadlineExceeded),
        }
    }
}
