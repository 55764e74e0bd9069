//! Cooperative cancellation for API calls.
//!
//! Every transport call takes a [`CancelToken`]. Cancelling it, or letting its
//! deadline pass, aborts the in-flight request and any backoff sleep between
//! retry attempts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Clonable cancellation signal with an optional deadline.
///
/// Clones share the same signal: cancelling one cancels all of them.
#[derive(Debug, Clone)]
pub struct CancelToken {
    signal: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// Create a token that only fires when [`CancelToken::cancel`] is called.
    #[must_use]
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
            deadline: None,
        }
    }

    /// Return a token sharing this signal that also fires at `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Return a token sharing this signal that also fires after `timeout`.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.signal.send_replace(true);
    }

    /// Returns true once cancellation was requested or the deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.signal.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The configured deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves when the token fires, yielding the error to surface.
    pub async fn cancelled(&self) -> Error {
        let mut rx = self.signal.subscribe();
        let requested = async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                () = requested => Error::Cancelled("cancellation requested".to_string()),
                () = tokio::time::sleep_until(deadline) => {
                    Error::Timeout("deadline elapsed".to_string())
                }
            },
            None => {
                requested.await;
                Error::Cancelled("cancellation requested".to_string())
            }
        }
    }

    /// Run `fut` to completion unless the token fires first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] or [`Error::Timeout`] when the token fires.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            err = self.cancelled() => Err(err),
            output = fut => Ok(output),
        }
    }

    /// Sleep for `duration` unless the token fires first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] or [`Error::Timeout`] when the token fires.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(tokio::time::sleep(duration)).await
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
