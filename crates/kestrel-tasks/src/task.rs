//! Task identity, outcome reporting and handles.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{TaskError, TaskResult};

/// Unique identifier for a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a new, time-ordered task ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The task returned `Ok`.
    Completed,
    /// The task returned an error or panicked, or was aborted.
    Failed(TaskError),
}

impl TaskOutcome {
    pub(crate) fn of<T>(result: &TaskResult<T>) -> Self {
        match result {
            Ok(_) => Self::Completed,
            Err(error) => Self::Failed(error.clone()),
        }
    }

    /// Whether the task completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// The error, if the task did not complete.
    pub fn error(&self) -> Option<&TaskError> {
        match self {
            Self::Completed => None,
            Self::Failed(error) => Some(error),
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed(error) => write!(f, "{error}"),
        }
    }
}

/// Report handed to completion callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    /// Task identifier.
    pub id: TaskId,
    /// Name given at submission.
    pub name: String,
    /// How the task ended.
    pub outcome: TaskOutcome,
}

/// Counters describing queue activity since creation.
#[derive(Debug, Default)]
pub struct TaskStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl TaskStats {
    pub(crate) fn record_submit(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record(&self, outcome: &TaskOutcome) {
        let counter = if outcome.is_success() {
            &self.completed
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Tasks accepted by the queue.
    pub fn total_submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Tasks that returned `Ok`.
    pub fn total_completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Tasks that failed, panicked or were aborted.
    pub fn total_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// A handle to a submitted task.
///
/// Dropping the handle does not cancel the task: the queue keeps tracking
/// it and [`BackgroundQueue::drain`](crate::BackgroundQueue::drain) still
/// waits for it. Keep the handle only when the caller needs the value.
///
/// # Example
///
/// ```rust
/// use kestrel_tasks::BackgroundQueue;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let queue = BackgroundQueue::new();
/// let handle = queue.submit("checksum", || Ok(b"kestrel".len())).unwrap();
///
/// assert_eq!(handle.name(), "checksum");
/// assert_eq!(handle.join().await.unwrap(), 7);
/// # }
/// ```
#[derive(Debug)]
pub struct TaskHandle<T> {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) handle: JoinHandle<TaskResult<T>>,
}

impl<T> TaskHandle<T> {
    /// Get the task ID.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Get the task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether the task has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task and return its value.
    pub async fn join(self) -> TaskResult<T> {
        match self.handle.await {
            Ok(result) => result,
            Err(error) => Err(TaskError::from_join(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_unique_and_ordered() {
        let first = TaskId::new();
        let second = TaskId::new();
        assert_ne!(first, second);
        assert!(first < second);
        assert_eq!(first.to_string(), first.as_uuid().to_string());
    }

    #[test]
    fn test_outcome_of_result() {
        let ok: TaskResult<u8> = Ok(1);
        assert!(TaskOutcome::of(&ok).is_success());

        let err: TaskResult<u8> = Err(TaskError::panicked("boom"));
        let outcome = TaskOutcome::of(&err);
        assert!(!outcome.is_success());
        assert_eq!(outcome.error(), Some(&TaskError::panicked("boom")));
        assert_eq!(outcome.to_string(), "task panicked: boom");
    }

    #[test]
    fn test_stats_counters() {
        let stats = TaskStats::default();
        stats.record_submit();
        stats.record_submit();
        stats.record(&TaskOutcome::Completed);
        stats.record(&TaskOutcome::Failed(TaskError::panicked("x")));

        assert_eq!(stats.total_submitted(), 2);
        assert_eq!(stats.total_completed(), 1);
        assert_eq!(stats.total_failed(), 1);
    }
}
