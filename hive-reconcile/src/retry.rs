//! Fixed-interval retry while the remote side is in a transient state.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::context::OpContext;
use crate::error::Result;

/// What the retried action is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryGoal {
    /// The object must exist; absence means it is still materialising.
    Exists,
    /// The object must be gone; absence is the goal.
    Gone,
}

/// Result of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// Condition holds.
    Ready(T),
    /// Observed a transient state; try again after the interval.
    Transient(String),
    /// The object does not exist.
    Absent,
}

/// Retries an action at a fixed interval until its condition holds.
///
/// There is no backoff growth. The context deadline bounds the whole loop:
/// with a budget `D` and interval `I` the retrier gives up with `Timeout`
/// no later than `D + I` after it started.
#[derive(Debug, Clone, Copy)]
pub struct Retrier {
    interval: Duration,
}

impl Retrier {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Run `action` until it is ready (`Some(value)`) or, for
    /// [`RetryGoal::Gone`], until the object is absent (`None`).
    ///
    /// An action error whose remote cause is classified absent counts as
    /// [`Attempt::Absent`]. Any other error is returned immediately.
    pub async fn retry_until<T, F, Fut>(
        &self,
        ctx: &OpContext,
        goal: RetryGoal,
        what: &str,
        mut action: F,
    ) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Attempt<T>>>,
    {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let attempt = match action().await {
                Ok(attempt) => attempt,
                Err(e) if e.is_absent() => Attempt::Absent,
                Err(e) => return Err(e),
            };

            match (attempt, goal) {
                (Attempt::Ready(value), _) => return Ok(Some(value)),
                (Attempt::Absent, RetryGoal::Gone) => return Ok(None),
                (Attempt::Absent, RetryGoal::Exists) => {
                    debug!(what, attempts, "Not present yet");
                }
                (Attempt::Transient(reason), _) => {
                    debug!(what, attempts, reason = %reason, "Transient state");
                }
            }

            ctx.sleep(self.interval, what).await?;
        }
    }
}
