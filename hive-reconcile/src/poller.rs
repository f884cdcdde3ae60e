//! Task polling.
//!
//! Two kinds of remote work end up here: real asynchronous tasks, which are
//! re-read until terminal, and unacknowledged calls (the remote API returns
//! no task), which wait a fixed settle delay and then re-read the object.
//! Both are [`Pollable`] so reconcilers drive them the same way.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::api::{HiveApi, Task, TaskHandle, TaskState};
use crate::context::OpContext;
use crate::error::{ReconcileError, Result};

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Succeeded,
    /// The remote side reported failure; the message is kept verbatim.
    Failed(String),
    InProgress,
}

impl OperationOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationOutcome::InProgress)
    }
}

impl Task {
    pub fn outcome(&self) -> OperationOutcome {
        match self.state {
            TaskState::Completed => OperationOutcome::Succeeded,
            TaskState::Failed => OperationOutcome::Failed(self.message.clone()),
            _ => OperationOutcome::InProgress,
        }
    }

    /// Surface a failed task as [`ReconcileError::TaskFailed`].
    pub fn into_result(self, operation: &str) -> Result<Task> {
        match self.outcome() {
            OperationOutcome::Failed(message) => Err(ReconcileError::TaskFailed {
                operation: operation.to_string(),
                message,
            }),
            _ => Ok(self),
        }
    }
}

/// Something that can be polled towards a terminal outcome.
#[async_trait]
pub trait Pollable: Send {
    /// Short label for logs and timeout errors.
    fn operation(&self) -> &str;

    async fn poll(&mut self) -> Result<OperationOutcome>;
}

/// A remote task, re-read on every poll.
pub struct RemoteTask {
    api: Arc<dyn HiveApi>,
    handle: TaskHandle,
    operation: String,
    last: Option<Task>,
}

impl RemoteTask {
    pub fn new(api: Arc<dyn HiveApi>, handle: TaskHandle, operation: impl Into<String>) -> Self {
        Self {
            api,
            handle,
            operation: operation.into(),
            last: None,
        }
    }

    /// Last snapshot seen, if any poll happened.
    pub fn into_task(self) -> Option<Task> {
        self.last
    }
}

#[async_trait]
impl Pollable for RemoteTask {
    fn operation(&self) -> &str {
        &self.operation
    }

    async fn poll(&mut self) -> Result<OperationOutcome> {
        let task = self.api.get_task(&self.handle).await?;
        debug!(
            task_id = %self.handle,
            state = ?task.state,
            progress = task.progress,
            "Polled task"
        );
        let outcome = task.outcome();
        self.last = Some(task);
        Ok(outcome)
    }
}

/// A remote call that returned no task.
///
/// The first poll sleeps `delay` (not cancellable; it bounds latency, not
/// correctness), then runs `reread` and reports success with the re-read
/// object kept for the caller.
pub struct Unacknowledged<F, T> {
    operation: String,
    delay: Duration,
    reread: F,
    observed: Option<T>,
}

impl<F, Fut, T> Unacknowledged<F, T>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T>> + Send,
    T: Send,
{
    pub fn new(operation: impl Into<String>, delay: Duration, reread: F) -> Self {
        Self {
            operation: operation.into(),
            delay,
            reread,
            observed: None,
        }
    }

    pub fn into_observed(self) -> Option<T> {
        self.observed
    }
}

#[async_trait]
impl<F, Fut, T> Pollable for Unacknowledged<F, T>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T>> + Send,
    T: Send,
{
    fn operation(&self) -> &str {
        &self.operation
    }

    async fn poll(&mut self) -> Result<OperationOutcome> {
        if self.observed.is_none() {
            debug!(operation = %self.operation, delay = ?self.delay, "Settling");
            tokio::time::sleep(self.delay).await;
            self.observed = Some((self.reread)().await?);
        }
        Ok(OperationOutcome::Succeeded)
    }
}

/// Polls a [`Pollable`] at a fixed cadence until it is terminal.
#[derive(Debug, Clone, Copy)]
pub struct TaskPoller {
    interval: Duration,
}

impl TaskPoller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Poll until terminal. Between polls the context's deadline-clamped
    /// sleep is used, so an expired or cancelled context returns `Timeout`
    /// promptly instead of spinning.
    pub async fn wait<P>(&self, ctx: &OpContext, pollable: &mut P) -> Result<OperationOutcome>
    where
        P: Pollable + ?Sized,
    {
        loop {
            let outcome = pollable.poll().await?;
            if outcome.is_terminal() {
                return Ok(outcome);
            }
            ctx.sleep(self.interval, pollable.operation()).await?;
        }
    }

    /// Wait for a remote task and return its terminal snapshot, failed or not.
    pub async fn await_task(
        &self,
        ctx: &OpContext,
        api: &Arc<dyn HiveApi>,
        handle: TaskHandle,
        operation: &str,
    ) -> Result<Task> {
        let mut task = RemoteTask::new(Arc::clone(api), handle, operation);
        let outcome = self.wait(ctx, &mut task).await?;
        if let OperationOutcome::Failed(message) = &outcome {
            warn!(operation, message = %message, "Task failed");
        }
        task.into_task()
            .ok_or_else(|| ctx.timeout_error(operation))
    }

    /// Wait for a remote task; a failed task becomes [`ReconcileError::TaskFailed`].
    pub async fn complete_task(
        &self,
        ctx: &OpContext,
        api: &Arc<dyn HiveApi>,
        handle: TaskHandle,
        operation: &str,
    ) -> Result<Task> {
        self.await_task(ctx, api, handle, operation)
            .await?
            .into_result(operation)
    }

    /// Settle after an unacknowledged call and return the re-read object.
    pub async fn settle<F, Fut, T>(
        &self,
        ctx: &OpContext,
        operation: &str,
        delay: Duration,
        reread: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let mut pending = Unacknowledged::new(operation, delay, reread);
        self.wait(ctx, &mut pending).await?;
        pending
            .into_observed()
            .ok_or_else(|| ctx.timeout_error(operation))
    }
}
