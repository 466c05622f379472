//! Per-invocation context handed to task bodies.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};

use crate::core::events::{build_event, emit, EventKind, EventSink};
use crate::util::clock::{Clock, SystemClock};

/// Cooperative cancellation flag shared by the scheduler and running tasks.
///
/// Tasks cannot be preempted; they observe this signal through
/// [`ExecutionContext::is_cancelled`] or [`ExecutionContext::sleep`].
#[derive(Clone, Default)]
pub struct CancellationSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationSignal {
    /// Create an un-cancelled signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel and wake every sleeper.
    pub fn cancel(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock() = true;
        condvar.notify_all();
    }

    /// Whether `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `true` if the full duration elapsed, `false` on cancellation.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, condvar) = &*self.inner;
        let mut cancelled = flag.lock();
        let Some(deadline) = Instant::now().checked_add(duration) else {
            while !*cancelled {
                condvar.wait(&mut cancelled);
            }
            return false;
        };
        while !*cancelled {
            if condvar.wait_until(&mut cancelled, deadline).timed_out() {
                return !*cancelled;
            }
        }
        false
    }
}

impl fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Identity and services for one task invocation.
///
/// The worker identity is passed explicitly so task bodies can log it
/// without consulting thread-local state.
pub struct ExecutionContext {
    task_id: String,
    worker_id: usize,
    worker_name: String,
    run: u64,
    scheduled_for: DateTime<Utc>,
    cancellation: CancellationSignal,
    clock: Arc<dyn Clock>,
    events: Option<Arc<dyn EventSink>>,
}

impl ExecutionContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        task_id: &str,
        worker_id: usize,
        worker_name: &str,
        run: u64,
        scheduled_for: DateTime<Utc>,
        cancellation: CancellationSignal,
        clock: Arc<dyn Clock>,
        events: Option<Arc<dyn EventSink>>,
    ) -> Self {
        Self {
            task_id: task_id.to_string(),
            worker_id,
            worker_name: worker_name.to_string(),
            run,
            scheduled_for,
            cancellation,
            clock,
            events,
        }
    }

    /// Context for running an action outside any scheduler, on the calling thread.
    #[must_use]
    pub fn standalone(task_id: &str, events: Option<Arc<dyn EventSink>>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let now = clock.now();
        let worker_name = std::thread::current()
            .name()
            .unwrap_or("standalone")
            .to_string();
        Self::new(
            task_id,
            0,
            &worker_name,
            1,
            now,
            CancellationSignal::new(),
            clock,
            events,
        )
    }

    /// Replace the cancellation signal.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationSignal) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Id of the running task.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Index of the worker running this invocation.
    #[must_use]
    pub const fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Name of the worker thread running this invocation.
    #[must_use]
    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    /// 1-based run counter for this task.
    #[must_use]
    pub const fn run(&self) -> u64 {
        self.run
    }

    /// Instant the trigger asked for.
    #[must_use]
    pub const fn scheduled_for(&self) -> DateTime<Utc> {
        self.scheduled_for
    }

    /// Current time per the scheduler clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Whether the scheduler is stopping.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancellable sleep; `false` if interrupted by `stop`.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> bool {
        self.cancellation.sleep(duration)
    }

    /// Log a structured event for this task and record it in the sink.
    pub fn emit(&self, kind: EventKind, message: impl Into<String>) {
        emit(
            self.events.as_deref(),
            build_event(
                kind,
                self.task_id.as_str(),
                Some(&self.worker_name),
                message,
                self.clock.now(),
            ),
        );
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("task_id", &self.task_id)
            .field("worker_id", &self.worker_id)
            .field("worker_name", &self.worker_name)
            .field("run", &self.run)
            .field("scheduled_for", &self.scheduled_for)
            .finish_non_exhaustive()
    }
}
