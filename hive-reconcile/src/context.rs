//! Per-call operation context: deadline and cancellation.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ReconcileError, Result};

/// Which verb an operation belongs to; selects the timeout budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    Create,
    Read,
    Update,
    Delete,
}

/// Deadline and cancellation signal carried through one reconciliation call.
///
/// Only the two blocking points (task polling and transient retry) look at
/// it. Cancellation is a `watch` channel flipped to `true`; both deadline and
/// cancellation surface as [`ReconcileError::Timeout`].
#[derive(Debug, Clone)]
pub struct OpContext {
    started: Instant,
    deadline: Instant,
    cancel: Option<watch::Receiver<bool>>,
}

impl OpContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + timeout,
            cancel: None,
        }
    }

    /// Attach a cancellation signal. Sending `true` cancels.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    pub fn timeout_error(&self, operation: &str) -> ReconcileError {
        ReconcileError::Timeout {
            operation: operation.to_string(),
            elapsed: self.elapsed(),
        }
    }

    /// Fail fast if the deadline has passed or the call was cancelled.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() || Instant::now() >= self.deadline {
            return Err(self.timeout_error(operation));
        }
        Ok(())
    }

    /// Sleep for `delay`, clamped to the deadline.
    ///
    /// Returns `Timeout` as soon as the deadline is reached or the
    /// cancellation signal fires, whichever comes first.
    pub async fn sleep(&self, delay: Duration, operation: &str) -> Result<()> {
        self.check(operation)?;

        let wake = std::cmp::min(Instant::now() + delay, self.deadline);
        tokio::select! {
            _ = tokio::time::sleep_until(wake) => {}
            _ = cancelled(self.cancel.clone()) => {
                debug!(operation, "Operation cancelled");
                return Err(self.timeout_error(operation));
            }
        }

        if Instant::now() >= self.deadline {
            return Err(self.timeout_error(operation));
        }
        Ok(())
    }
}

/// Resolves once the signal reads `true`. Never resolves without a signal or
/// after the sender is gone.
async fn cancelled(cancel: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = cancel {
        let closed = rx.wait_for(|c| *c).await.is_err();
        if !closed {
            return;
        }
    }
    std::future::pending::<()>().await
}
