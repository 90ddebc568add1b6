//! Error types for the workflow kernel.
//!
//! Errors are classified by recoverability, mirroring how a turn is allowed
//! to react to them:
//! - `Retryable`: the caller may resend the same turn and it will re-read
//!   the latest state (lock contention, transient I/O).
//! - `NonRetryable`: the turn is done; the inbound message itself is
//!   malformed or refers to something that does not exist.
//! - `Escalate`: the turn could not be completed safely; the event is
//!   parked in `AwaitingManagerReview` and a manual-review task is created.

use thiserror::Error;

/// Errors raised while running a turn through the kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("lock on tenant state timed out after {0:?}")]
    LockTimeout(std::time::Duration),

    #[error("malformed inbound message: {0}")]
    Malformed(String),

    #[error("storage I/O error: {0}")]
    StorageIo(String),

    #[error("state document at {0} is corrupt: {1}")]
    CorruptState(String, String),

    #[error("HIL task {0} not found")]
    HilNotFound(String),

    #[error("HIL task {task_id} has type {actual}, expected {expected}")]
    HilWrongType {
        task_id: String,
        actual: String,
        expected: String,
    },

    #[error("event {0} not found")]
    EventNotFound(String),

    #[error("step handler for step {0} panicked: {1}")]
    StepPanic(u8, String),

    #[error("invalid auth mode: {0}")]
    InvalidAuthMode(String),

    #[error("unauthorized")]
    Unauthorized,
}

/// How a caller should react to a [`KernelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recoverability {
    Retryable,
    NonRetryable,
    Escalate,
}

impl KernelError {
    pub fn recoverability(&self) -> Recoverability {
        match self {
            KernelError::LockTimeout(_) => Recoverability::Retryable,
            KernelError::StepPanic(_, _) => Recoverability::Escalate,
            KernelError::Malformed(_)
            | KernelError::StorageIo(_)
            | KernelError::CorruptState(_, _)
            | KernelError::HilNotFound(_)
            | KernelError::HilWrongType { .. }
            | KernelError::EventNotFound(_)
            | KernelError::InvalidAuthMode(_)
            | KernelError::Unauthorized => Recoverability::NonRetryable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.recoverability() == Recoverability::Retryable
    }
}

impl From<std::io::Error> for KernelError {
    fn from(err: std::io::Error) -> Self {
        KernelError::StorageIo(err.to_string())
    }
}

impl From<serde_json::Error> for KernelError {
    fn from(err: serde_json::Error) -> Self {
        KernelError::CorruptState("<document>".to_string(), err.to_string())
    }
}

/// Wire-safe projection of [`KernelError`] for the HTTP transport, analogous
/// to how the reference backend projects `ExecutionError` into `WorkflowError`
/// for its IPC boundary.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub message: String,
    pub kind: Recoverability,
    pub can_retry: bool,
}

impl From<&KernelError> for ApiError {
    fn from(err: &KernelError) -> Self {
        let kind = err.recoverability();
        ApiError {
            message: err.to_string(),
            kind,
            can_retry: kind == Recoverability::Retryable,
        }
    }
}
