//! Structured scheduler events.
//!
//! Every lifecycle step is logged through `tracing`. An optional [`EventSink`]
//! receives the same events, which lets callers (and tests) observe ordering and
//! timing without scraping log output.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn, Level};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A task body is about to run.
    TaskStarted,
    /// A task body returned successfully.
    TaskCompleted,
    /// A task body returned an error or panicked.
    TaskFailed,
    /// A task's trigger produced no further execution time.
    TaskRetired,
    /// A demo task acquired its lock.
    LockEntered,
    /// A demo task released its lock.
    LockReleased,
    /// `stop` gave up waiting on a task.
    CancellationTimeout,
}

impl EventKind {
    /// Log level this kind is reported at.
    #[must_use]
    pub const fn level(self) -> Level {
        match self {
            Self::TaskFailed => Level::ERROR,
            Self::CancellationTimeout => Level::WARN,
            Self::TaskStarted | Self::TaskCompleted => Level::DEBUG,
            Self::TaskRetired | Self::LockEntered | Self::LockReleased => Level::INFO,
        }
    }

    /// Stable snake_case name, used as the `event` log field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskStarted => "task_started",
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::TaskRetired => "task_retired",
            Self::LockEntered => "lock_entered",
            Self::LockReleased => "lock_released",
            Self::CancellationTimeout => "cancellation_timeout",
        }
    }
}

/// One structured scheduler event.
#[derive(Debug, Clone)]
pub struct SchedulerEvent {
    /// Unique event identifier.
    pub event_id: String,
    /// When the event happened, per the scheduler clock.
    pub at: DateTime<Utc>,
    /// Severity.
    pub level: Level,
    /// Event kind.
    pub kind: EventKind,
    /// Task the event is about.
    pub task_id: String,
    /// Worker thread that produced the event, if any.
    pub worker: Option<String>,
    /// Human-readable message.
    pub message: String,
}

/// Event sink abstraction.
pub trait EventSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: SchedulerEvent);
}

/// Bounded in-memory sink for testing and dev. Oldest events are evicted first.
pub struct InMemoryEventSink {
    events: Mutex<VecDeque<SchedulerEvent>>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Events for a single task, oldest first.
    #[must_use]
    pub fn events_for(&self, task_id: &str) -> Vec<SchedulerEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect()
    }

    /// Timestamps of every `kind` event for `task_id`, oldest first.
    #[must_use]
    pub fn instants(&self, task_id: &str, kind: EventKind) -> Vec<DateTime<Utc>> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.task_id == task_id && e.kind == kind)
            .map(|e| e.at)
            .collect()
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for InMemoryEventSink {
    fn record(&self, event: SchedulerEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Helper to build an event from context.
pub fn build_event(
    kind: EventKind,
    task_id: impl Into<String>,
    worker: Option<&str>,
    message: impl Into<String>,
    at: DateTime<Utc>,
) -> SchedulerEvent {
    SchedulerEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        at,
        level: kind.level(),
        kind,
        task_id: task_id.into(),
        worker: worker.map(str::to_string),
        message: message.into(),
    }
}

/// Log `event` and hand it to `sink`.
pub(crate) fn emit(sink: Option<&dyn EventSink>, event: SchedulerEvent) {
    let worker = event.worker.as_deref().unwrap_or("scheduler");
    let kind = event.kind.as_str();
    match event.kind {
        EventKind::TaskFailed => {
            error!(task_id = %event.task_id, worker, event = kind, "{}", event.message);
        }
        EventKind::CancellationTimeout => {
            warn!(task_id = %event.task_id, worker, event = kind, "{}", event.message);
        }
        EventKind::TaskStarted | EventKind::TaskCompleted => {
            debug!(task_id = %event.task_id, worker, event = kind, "{}", event.message);
        }
        EventKind::TaskRetired | EventKind::LockEntered | EventKind::LockReleased => {
            info!(task_id = %event.task_id, worker, event = kind, "{}", event.message);
        }
    }
    if let Some(sink) = sink {
        sink.record(event);
    }
}
