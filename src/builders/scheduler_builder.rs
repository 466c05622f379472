//! Scheduler construction from configuration.
//!
//! Tasks are declared up front, either as rows of a [`TaskTable`] whose actions
//! come from a factory, or one by one through [`SchedulerBuilder`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{SchedulerConfig, TriggerConfig};
use crate::core::{
    EventSink, ExecutionContext, SchedulerError, Task, TaskAction, TaskScheduler, Trigger,
};
use crate::util::clock::Clock;

/// One declarative task: an id and how it is triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRow {
    /// Task identifier.
    pub id: String,
    /// Trigger description.
    pub trigger: TriggerConfig,
}

/// Scheduler configuration plus its static task table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTable {
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Tasks to register.
    pub tasks: Vec<TaskRow>,
}

impl TaskTable {
    /// Parse a task table from JSON and validate the scheduler section.
    ///
    /// # Errors
    ///
    /// Returns a message on parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let table: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        table.scheduler.validate()?;
        Ok(table)
    }
}

/// Build a scheduler from a task table, resolving each row's action through
/// the provided factory.
///
/// # Errors
///
/// Returns the first configuration, factory, trigger or registration error.
pub fn build_scheduler<F>(
    table: &TaskTable,
    mut action_factory: F,
) -> Result<TaskScheduler, SchedulerError>
where
    F: FnMut(&TaskRow) -> Result<TaskAction, SchedulerError>,
{
    let scheduler = TaskScheduler::new(table.scheduler.clone())?;
    for row in &table.tasks {
        let trigger = row.trigger.build().map_err(|e| e.for_task(&row.id))?;
        let action = action_factory(row)?;
        scheduler.register_task(Task::from_action(row.id.clone(), action, trigger))?;
    }
    Ok(scheduler)
}

/// Fluent scheduler builder.
///
/// Errors from trigger parsing are deferred to [`build`](Self::build) so
/// registrations can be chained.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    clock: Option<Arc<dyn Clock>>,
    events: Option<Arc<dyn EventSink>>,
    tasks: Vec<Result<Task, SchedulerError>>,
}

impl SchedulerBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            clock: None,
            events: None,
            tasks: Vec::new(),
        }
    }

    /// Use a specific clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Record events into `sink`.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Add a task with a runtime trigger.
    #[must_use]
    pub fn task<F>(mut self, id: impl Into<String>, action: F, trigger: Trigger) -> Self
    where
        F: Fn(&ExecutionContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.tasks.push(Ok(Task::new(id, action, trigger)));
        self
    }

    /// Add a task described by a trigger config.
    #[must_use]
    pub fn configured_task<F>(
        mut self,
        id: impl Into<String>,
        action: F,
        trigger: &TriggerConfig,
    ) -> Self
    where
        F: Fn(&ExecutionContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = id.into();
        let task = trigger
            .build()
            .map(|trigger| Task::new(id.clone(), action, trigger))
            .map_err(|e| e.for_task(&id));
        self.tasks.push(task);
        self
    }

    /// Add prebuilt tasks.
    #[must_use]
    pub fn tasks(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        self.tasks.extend(tasks.into_iter().map(Ok));
        self
    }

    /// Create the scheduler and register every task, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns the first configuration, trigger or registration error.
    pub fn build(self) -> Result<TaskScheduler, SchedulerError> {
        let mut scheduler = TaskScheduler::new(self.config)?;
        if let Some(clock) = self.clock {
            scheduler = scheduler.with_clock(clock);
        }
        if let Some(events) = self.events {
            scheduler = scheduler.with_event_sink(events);
        }
        for task in self.tasks {
            scheduler.register_task(task?)?;
        }
        Ok(scheduler)
    }
}
