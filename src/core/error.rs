//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
///
/// Only configuration-time variants ever reach the caller of
/// [`TaskScheduler::register`](crate::core::TaskScheduler::register).
/// `TaskExecution` is built at the worker boundary and logged, and
/// `CancellationTimeout` is a warning surfaced through
/// [`ShutdownReport::ensure_drained`](crate::core::ShutdownReport::ensure_drained).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// A task with this id is already registered.
    #[error("duplicate task: {0}")]
    DuplicateTask(String),
    /// A task body returned an error or panicked.
    #[error("task `{task_id}` failed: {message}")]
    TaskExecution {
        /// Failing task.
        task_id: String,
        /// Rendered error or panic payload.
        message: String,
    },
    /// A trigger could not produce a next execution time.
    #[error("trigger for `{task_id}` cannot compute next execution: {reason}")]
    TriggerComputation {
        /// Task the trigger belongs to (empty while the trigger is unbound).
        task_id: String,
        /// Why computation failed.
        reason: String,
    },
    /// `stop` returned while tasks were still running.
    #[error("stop timed out with tasks still in flight: {}", still_running.join(", "))]
    CancellationTimeout {
        /// Ids of the tasks that had not finished.
        still_running: Vec<String>,
    },
    /// Tasks can only be registered before `start`.
    #[error("scheduler already started")]
    AlreadyStarted,
    /// The scheduler has been stopped.
    #[error("scheduler has been shut down")]
    Shutdown,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A scheduler thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(String),
}

impl SchedulerError {
    /// Attach the owning task id to an unbound trigger error.
    #[must_use]
    pub fn for_task(self, id: &str) -> Self {
        match self {
            Self::TriggerComputation { task_id, reason } if task_id.is_empty() => {
                Self::TriggerComputation {
                    task_id: id.to_string(),
                    reason,
                }
            }
            other => other,
        }
    }

    pub(crate) fn trigger(reason: impl Into<String>) -> Self {
        Self::TriggerComputation {
            task_id: String::new(),
            reason: reason.into(),
        }
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
