//! Error types for background task operations.

use thiserror::Error;

/// Result type for task operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors that can occur while submitting or joining a task.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// No Tokio runtime was available to run the task on.
    #[error("no tokio runtime available to run background tasks")]
    NoRuntime,

    /// The task panicked.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task returned an error.
    #[error("task failed: {0}")]
    Failed(String),

    /// The task was aborted before it finished, usually by runtime shutdown.
    #[error("task cancelled: {0}")]
    Cancelled(String),
}

impl TaskError {
    /// Create a panicked error.
    pub fn panicked(reason: impl Into<String>) -> Self {
        Self::Panicked(reason.into())
    }

    /// Create a failed error from any error, keeping its full cause chain.
    pub fn failed(error: &anyhow::Error) -> Self {
        Self::Failed(format!("{error:#}"))
    }

    /// Create a cancelled error.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }

    /// Whether the task body itself went wrong, as opposed to never running.
    pub fn is_task_fault(&self) -> bool {
        matches!(self, Self::Panicked(_) | Self::Failed(_))
    }

    /// Build a task error from a Tokio join failure.
    pub(crate) fn from_join(error: tokio::task::JoinError) -> Self {
        if error.is_panic() {
            Self::Panicked(panic_message(error.into_panic().as_ref()))
        } else {
            Self::cancelled(error.to_string())
        }
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
