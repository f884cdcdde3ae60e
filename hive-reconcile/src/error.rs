//! Reconciliation error types.

use std::time::Duration;

use thiserror::Error;

use crate::api::ApiError;
use crate::reconciler::ObjectKind;

/// Errors that can abort a reconciliation call.
///
/// `NotFound` is the only class a reconciler ever recovers from locally (Read
/// clears the identity, Delete treats it as done). Everything else aborts the
/// current verb; the caller retries the whole verb.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The remote object does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: ObjectKind, id: String },

    /// A remote asynchronous task finished in the failed state.
    #[error("{operation} failed: {message}")]
    TaskFailed { operation: String, message: String },

    /// Any other remote call failure (transport, auth, validation on the remote side).
    #[error("remote call failed: {0}")]
    Remote(#[from] ApiError),

    /// Deadline exceeded or the operation was cancelled.
    #[error("timed out after {elapsed:?} waiting for {operation}")]
    Timeout { operation: String, elapsed: Duration },

    /// The remote system is not in a state that lets the operation proceed.
    #[error("precondition unmet: {0}")]
    PreconditionUnmet(String),

    /// The declared state cannot be reconciled as written.
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    /// An in-place update was requested for fields that need destroy + recreate.
    #[error("{kind} {id} must be replaced, force-replace fields changed: {}", fields.join(", "))]
    ForceReplace {
        kind: ObjectKind,
        id: String,
        fields: Vec<String>,
    },

    /// A lifecycle transition not present in the kind's transition table.
    #[error("illegal {kind} transition {from} -> {to}")]
    InvalidTransition {
        kind: ObjectKind,
        from: String,
        to: String,
    },
}

impl ReconcileError {
    /// True when the failure means the remote object is absent.
    pub fn is_absent(&self) -> bool {
        match self {
            ReconcileError::NotFound { .. } => true,
            ReconcileError::Remote(e) => crate::absence::is_absent(e),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ReconcileError::Timeout { .. })
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
