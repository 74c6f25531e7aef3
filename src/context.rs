use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::transport::TransportError;

/// Deadline and cancellation carried by every client call.
///
/// Cloning a context shares its cancellation token, so cancelling any clone
/// cancels them all.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Context {
    /// A context that never expires and is never cancelled unless asked to
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: CancellationToken::new(),
        }
    }

    /// A context sharing this one's cancellation, expiring at the earlier of both deadlines
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
            cancel: self.cancel.child_token(),
        }
    }

    /// The deadline, if any
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels this context and every clone and child of it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns the error the context ended with, or `None` while it is still live
    #[must_use]
    pub fn err(&self) -> Option<Error> {
        if self.cancel.is_cancelled() {
            Some(Error::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(Error::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Drives a transport call until it finishes or the context ends.
    ///
    /// When the context ends first the call's future is dropped.
    ///
    /// # Errors
    ///
    /// - `Cancelled` or `DeadlineExceeded` if the context ends first,
    /// - `Transport` with the call's own error otherwise.
    pub async fn run<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, TransportError>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            () = expiry(self.deadline) => Err(Error::DeadlineExceeded),
            result = call => result.map_err(Error::from),
        }
    }

    /// Sleeps for `period`, waking early if the context ends.
    ///
    /// # Errors
    ///
    /// - `Cancelled` or `DeadlineExceeded` if the context ends before `period` elapses.
    pub async fn sleep(&self, period: Duration) -> Result<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            () = expiry(self.deadline) => Err(Error::DeadlineExceeded),
            () = tokio::time::sleep(period) => Ok(()),
        }
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
