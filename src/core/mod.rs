//! Core scheduling abstractions: triggers, tasks and the scheduler.

pub mod context;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod task;
pub mod trigger;

pub use context::{CancellationSignal, ExecutionContext};
pub use error::{AppResult, SchedulerError};
pub use events::{build_event, EventKind, EventSink, InMemoryEventSink, SchedulerEvent};
pub use scheduler::{SchedulerStats, ShutdownReport, TaskScheduler};
pub use task::{ExecutionRecord, Task, TaskAction};
pub use trigger::{CronTrigger, CronZone, CustomTrigger, Trigger, TriggerPolicy};
