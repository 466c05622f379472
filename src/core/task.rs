//! Task definitions and execution bookkeeping.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::{ExecutionContext, SchedulerError, Trigger};

/// Body of a scheduled task.
///
/// Receives the invocation context explicitly instead of reading ambient
/// thread state. Errors are contained by the scheduler and logged.
pub type TaskAction = Arc<dyn Fn(&ExecutionContext) -> anyhow::Result<()> + Send + Sync>;

/// Execution history fed back into the trigger.
///
/// Written only by the scheduler, right before and right after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionRecord {
    /// When the most recent run started.
    pub last_start: Option<DateTime<Utc>>,
    /// When the most recent run finished, successfully or not.
    pub last_completion: Option<DateTime<Utc>>,
    /// Runs started so far.
    pub runs: u64,
    /// Runs that returned an error or panicked.
    pub failures: u64,
}

impl ExecutionRecord {
    /// Record with both instants set, for trigger computations in tests and tools.
    #[must_use]
    pub const fn completed(started: DateTime<Utc>, finished: DateTime<Utc>) -> Self {
        Self {
            last_start: Some(started),
            last_completion: Some(finished),
            runs: 1,
            failures: 0,
        }
    }
}

/// A unit of work bound to exactly one trigger.
#[derive(Clone)]
pub struct Task {
    id: String,
    action: TaskAction,
    trigger: Trigger,
}

impl Task {
    /// Create a task.
    pub fn new<F>(id: impl Into<String>, action: F, trigger: Trigger) -> Self
    where
        F: Fn(&ExecutionContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::from_action(id, Arc::new(action), trigger)
    }

    /// Create a task from an already shared action.
    pub fn from_action(id: impl Into<String>, action: TaskAction, trigger: Trigger) -> Self {
        Self {
            id: id.into(),
            action,
            trigger,
        }
    }

    /// Task identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Trigger driving this task.
    #[must_use]
    pub const fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Run the body once, turning errors and panics into `TaskExecution`.
    pub(crate) fn invoke(&self, ctx: &ExecutionContext) -> Result<(), SchedulerError> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.action)(ctx))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SchedulerError::TaskExecution {
                task_id: self.id.clone(),
                message: format!("{e:#}"),
            }),
            Err(payload) => Err(SchedulerError::TaskExecution {
                task_id: self.id.clone(),
                message: format!("panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn trigger() -> Trigger {
        Trigger::fixed_delay(Duration::from_secs(1))
    }

    #[test]
    fn test_invoke_ok() {
        let task = Task::new("ok", |_ctx| Ok(()), trigger());
        let ctx = ExecutionContext::standalone("ok", None);
        assert!(task.invoke(&ctx).is_ok());
    }

    #[test]
    fn test_invoke_error_is_wrapped() {
        let task = Task::new("err", |_ctx| Err(anyhow::anyhow!("disk full")), trigger());
        let ctx = ExecutionContext::standalone("err", None);
        let err = task.invoke(&ctx).unwrap_err();
        assert_eq!(
            err,
            SchedulerError::TaskExecution {
                task_id: "err".into(),
                message: "disk full".into(),
            }
        );
    }

    #[test]
    fn test_invoke_panic_is_contained() {
        let task = Task::new("boom", |_ctx| panic!("kaboom"), trigger());
        let ctx = ExecutionContext::standalone("boom", None);
        match task.invoke(&ctx) {
            Err(SchedulerError::TaskExecution { message, .. }) => {
                assert!(message.contains("kaboom"));
            }
            other => panic!("expected TaskExecution, got {other:?}"),
        }
    }
}
