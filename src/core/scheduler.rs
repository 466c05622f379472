//! Task scheduler with a dedicated timing thread and a fixed worker pool.
//!
//! One timing thread keeps every armed task in a min-heap keyed by due time
//! and sleeps on a `Condvar` until the earliest one is due. Due tasks are sent
//! over a channel to a fixed set of OS worker threads.
//!
//! # Design Principles
//!
//! - **No polling**: the timing thread waits on a `Condvar` with a timeout;
//!   workers block on channel recv
//! - **No self-overlap**: a task is re-armed only after its run finished, and a
//!   per-task in-flight flag guards dispatch
//! - **Contained failures**: errors and panics from task bodies are logged and
//!   the task keeps its schedule
//! - **Cooperative shutdown**: `stop` cancels, waits up to a timeout, and
//!   reports whatever is still running instead of killing it

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::core::events::{build_event, emit, EventKind, EventSink};
use crate::core::{
    CancellationSignal, ExecutionContext, ExecutionRecord, SchedulerError, Task, Trigger,
};
use crate::util::clock::{until, Clock, SystemClock};

/// Statistics about scheduler activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Registered tasks.
    pub registered_tasks: usize,
    /// Tasks currently dispatched or running.
    pub in_flight_tasks: usize,
    /// Total runs started.
    pub started_runs: u64,
    /// Total runs that completed successfully.
    pub completed_runs: u64,
    /// Total runs that failed.
    pub failed_runs: u64,
}

/// Outcome of [`TaskScheduler::stop`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks still executing when the timeout expired, sorted by id.
    pub still_running: Vec<String>,
    /// Time spent inside `stop`.
    pub elapsed: Duration,
}

impl ShutdownReport {
    /// Whether every in-flight task finished before the timeout.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.still_running.is_empty()
    }

    /// Escalate an unclean shutdown into an error.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::CancellationTimeout` listing the abandoned tasks.
    pub fn ensure_drained(&self) -> Result<(), SchedulerError> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(SchedulerError::CancellationTimeout {
                still_running: self.still_running.clone(),
            })
        }
    }
}

/// Internal counters (lock-free atomics).
#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// A registered task with its execution history.
struct Entry {
    task: Task,
    record: Mutex<ExecutionRecord>,
    in_flight: AtomicBool,
}

/// Heap item; ordered so the earliest due time pops first.
struct Pending {
    due: DateTime<Utc>,
    seq: u64,
    entry: Arc<Entry>,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

struct TimerState {
    queue: BinaryHeap<Pending>,
    seq: u64,
    shutdown: bool,
}

/// A due task on its way to a worker.
struct Job {
    entry: Arc<Entry>,
    scheduled_for: DateTime<Utc>,
}

/// State shared by the timing thread, the workers and `stop`.
struct Shared {
    timer: Mutex<TimerState>,
    timer_cv: Condvar,
    jobs: Mutex<Option<Sender<Job>>>,
    active: Mutex<HashSet<String>>,
    drained: Condvar,
    cancellation: CancellationSignal,
    counters: Arc<Counters>,
    clock: Arc<dyn Clock>,
    events: Option<Arc<dyn EventSink>>,
}

struct Runtime {
    shared: Arc<Shared>,
    jobs_rx: Receiver<Job>,
    timer: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

enum Lifecycle {
    Idle,
    Running(Runtime),
    Stopped,
}

/// Periodic task scheduler.
///
/// Tasks are registered up front, then `start` arms them all. Each task fires
/// roughly when its trigger says and never overlaps with itself; different
/// tasks run concurrently on the worker pool.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use prometheus_cadence::config::SchedulerConfig;
/// use prometheus_cadence::core::{TaskScheduler, Trigger};
///
/// let scheduler = TaskScheduler::new(SchedulerConfig::new().with_worker_count(2))?;
/// scheduler.register(
///     "heartbeat",
///     |ctx| {
///         tracing::info!(worker = ctx.worker_name(), "alive");
///         Ok(())
///     },
///     Trigger::fixed_rate(Duration::from_secs(2)),
/// )?;
/// scheduler.start()?;
/// std::thread::sleep(Duration::from_secs(10));
/// let report = scheduler.stop(Duration::from_secs(5));
/// assert!(report.is_clean());
/// # Ok::<(), prometheus_cadence::core::SchedulerError>(())
/// ```
pub struct TaskScheduler {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    events: Option<Arc<dyn EventSink>>,
    entries: RwLock<HashMap<String, Arc<Entry>>>,
    counters: Arc<Counters>,
    lifecycle: Mutex<Lifecycle>,
}

impl TaskScheduler {
    /// Create an idle scheduler using the system clock.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        Ok(Self {
            config,
            clock: Arc::new(SystemClock),
            events: None,
            entries: RwLock::new(HashMap::new()),
            counters: Arc::new(Counters::default()),
            lifecycle: Mutex::new(Lifecycle::Idle),
        })
    }

    /// Replace the clock used for trigger computations and event timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach an event sink that receives every scheduler event.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Scheduler configuration.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a task against a trigger.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::DuplicateTask` if the id is taken
    /// - `SchedulerError::TriggerComputation` if the trigger is invalid or never fires
    /// - `SchedulerError::AlreadyStarted` / `SchedulerError::Shutdown` outside the idle state
    pub fn register<F>(
        &self,
        task_id: impl Into<String>,
        action: F,
        trigger: Trigger,
    ) -> Result<(), SchedulerError>
    where
        F: Fn(&ExecutionContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_task(Task::new(task_id, action, trigger))
    }

    /// Register a prebuilt task.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_task(&self, task: Task) -> Result<(), SchedulerError> {
        let lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running(_) => return Err(SchedulerError::AlreadyStarted),
            Lifecycle::Stopped => return Err(SchedulerError::Shutdown),
        }

        let id = task.id().to_string();
        if self.entries.read().contains_key(&id) {
            return Err(SchedulerError::DuplicateTask(id));
        }

        let trigger = task.trigger();
        trigger.validate().map_err(|e| e.for_task(&id))?;
        match trigger.next_execution_time(&ExecutionRecord::default(), self.clock.as_ref()) {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(SchedulerError::TriggerComputation {
                    task_id: id,
                    reason: "trigger never fires".into(),
                })
            }
            Err(e) => return Err(e.for_task(&id)),
        }

        info!(task_id = %id, trigger = trigger.kind(), "Task registered");
        let entry = Arc::new(Entry {
            task,
            record: Mutex::new(ExecutionRecord::default()),
            in_flight: AtomicBool::new(false),
        });
        self.entries.write().insert(id, entry);
        Ok(())
    }

    /// Start the timing thread and the worker pool. Calling it again while
    /// running is a no-op.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Shutdown` after `stop`
    /// - `SchedulerError::Spawn` if a thread cannot be created
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running(_) => {
                debug!("TaskScheduler already running");
                return Ok(());
            }
            Lifecycle::Stopped => return Err(SchedulerError::Shutdown),
        }

        let (jobs_tx, jobs_rx) = unbounded::<Job>();
        let shared = Arc::new(Shared {
            timer: Mutex::new(TimerState {
                queue: BinaryHeap::new(),
                seq: 0,
                shutdown: false,
            }),
            timer_cv: Condvar::new(),
            jobs: Mutex::new(Some(jobs_tx)),
            active: Mutex::new(HashSet::new()),
            drained: Condvar::new(),
            cancellation: CancellationSignal::new(),
            counters: Arc::clone(&self.counters),
            clock: Arc::clone(&self.clock),
            events: self.events.clone(),
        });

        let mut workers = Vec::with_capacity(self.config.worker_count);
        for worker_id in 0..self.config.worker_count {
            match spawn_worker(worker_id, jobs_rx.clone(), Arc::clone(&shared), &self.config) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Closing the channel lets the workers spawned so far exit.
                    *shared.jobs.lock() = None;
                    return Err(e);
                }
            }
        }

        let mut armed: Vec<_> = self.entries.read().values().cloned().collect();
        armed.sort_by(|a, b| a.task.id().cmp(b.task.id()));
        for entry in armed {
            let record = *entry.record.lock();
            shared.reschedule(&entry, &record);
        }

        let timer_shared = Arc::clone(&shared);
        let timer = thread::Builder::new()
            .name(format!("{}-timer", self.config.thread_name_prefix))
            .spawn(move || run_timer(&timer_shared))
            .map_err(|e| {
                *shared.jobs.lock() = None;
                SchedulerError::Spawn(e.to_string())
            })?;

        info!(
            worker_count = self.config.worker_count,
            tasks = self.entries.read().len(),
            "TaskScheduler started"
        );

        *lifecycle = Lifecycle::Running(Runtime {
            shared,
            jobs_rx,
            timer,
            workers,
        });
        Ok(())
    }

    /// Stop scheduling and wait up to `timeout` for running tasks.
    ///
    /// Cancellation is cooperative: tasks see it through their context, but a
    /// task blocked on a lock or ignoring the signal keeps running. Such tasks
    /// are listed in the report and their workers are detached. Stopping twice
    /// returns an empty report.
    pub fn stop(&self, timeout: Duration) -> ShutdownReport {
        let started = Instant::now();
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);
        let Lifecycle::Running(runtime) = previous else {
            return ShutdownReport {
                still_running: Vec::new(),
                elapsed: started.elapsed(),
            };
        };
        let Runtime {
            shared,
            jobs_rx,
            timer,
            workers,
        } = runtime;

        info!(timeout_ms = timeout.as_millis(), "Stopping TaskScheduler");
        shared.cancellation.cancel();
        {
            let mut state = shared.timer.lock();
            state.shutdown = true;
            state.queue.clear();
        }
        shared.timer_cv.notify_all();
        if timer.join().is_err() {
            warn!("Timer thread panicked");
        }

        // Dropping the sender unblocks idle workers; jobs that never reached a
        // worker are withdrawn here so only running tasks are waited on.
        *shared.jobs.lock() = None;
        while let Ok(job) = jobs_rx.try_recv() {
            job.entry.in_flight.store(false, Ordering::Release);
            shared.finish(job.entry.task.id());
        }

        let deadline = started.checked_add(timeout);
        let still_running = {
            let mut active = shared.active.lock();
            while !active.is_empty() {
                match deadline {
                    Some(deadline) => {
                        if shared.drained.wait_until(&mut active, deadline).timed_out() {
                            break;
                        }
                    }
                    None => shared.drained.wait(&mut active),
                }
            }
            let mut ids: Vec<String> = active.iter().cloned().collect();
            ids.sort();
            ids
        };

        if still_running.is_empty() {
            for (idx, worker) in workers.into_iter().enumerate() {
                if worker.join().is_err() {
                    warn!(worker_id = idx, "Worker panicked");
                }
            }
        } else {
            for id in &still_running {
                emit(
                    shared.events.as_deref(),
                    build_event(
                        EventKind::CancellationTimeout,
                        id.as_str(),
                        None,
                        format!("Task {id} still running after {timeout:?}; abandoning it"),
                        shared.clock.now(),
                    ),
                );
            }
            // Workers stuck in a task exit on their own once it returns.
            drop(workers);
        }

        let report = ShutdownReport {
            still_running,
            elapsed: started.elapsed(),
        };
        info!(
            clean = report.is_clean(),
            elapsed_ms = report.elapsed.as_millis(),
            "TaskScheduler stopped"
        );
        report
    }

    /// Async variant of [`stop`](Self::stop), run on tokio's blocking pool.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Spawn` if the blocking task could not complete.
    #[cfg(feature = "tokio-runtime")]
    pub async fn stop_async(
        self: &Arc<Self>,
        timeout: Duration,
    ) -> Result<ShutdownReport, SchedulerError> {
        let scheduler = Arc::clone(self);
        tokio::task::spawn_blocking(move || scheduler.stop(timeout))
            .await
            .map_err(|e| SchedulerError::Spawn(e.to_string()))
    }

    /// Whether `start` has run and `stop` has not.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running(_))
    }

    /// Registered task ids, sorted.
    #[must_use]
    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of a task's execution record.
    #[must_use]
    pub fn record(&self, task_id: &str) -> Option<ExecutionRecord> {
        self.entries
            .read()
            .get(task_id)
            .map(|entry| *entry.record.lock())
    }

    /// Get current scheduler statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let entries = self.entries.read();
        SchedulerStats {
            worker_count: self.config.worker_count,
            registered_tasks: entries.len(),
            in_flight_tasks: entries
                .values()
                .filter(|e| e.in_flight.load(Ordering::Acquire))
                .count(),
            started_runs: self.counters.started.load(Ordering::Relaxed),
            completed_runs: self.counters.completed.load(Ordering::Relaxed),
            failed_runs: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        // Signal shutdown but don't join: explicit `stop` is required for a
        // graceful wait.
        if let Lifecycle::Running(runtime) = &*self.lifecycle.lock() {
            runtime.shared.cancellation.cancel();
            runtime.shared.timer.lock().shutdown = true;
            runtime.shared.timer_cv.notify_all();
            *runtime.shared.jobs.lock() = None;
            debug!("TaskScheduler dropped without explicit stop - threads will be detached");
        }
    }
}

impl Shared {
    /// Hand a due entry to the worker pool unless it is still running.
    fn dispatch(&self, entry: Arc<Entry>, scheduled_for: DateTime<Utc>) {
        let id = entry.task.id().to_string();
        if entry.in_flight.swap(true, Ordering::AcqRel) {
            // The running invocation re-arms the task when it finishes.
            debug!(task_id = %id, "Task still running, skipping dispatch");
            return;
        }
        self.active.lock().insert(id.clone());

        let sent = self.jobs.lock().as_ref().is_some_and(|tx| {
            tx.send(Job {
                entry: Arc::clone(&entry),
                scheduled_for,
            })
            .is_ok()
        });
        if !sent {
            entry.in_flight.store(false, Ordering::Release);
            self.finish(&id);
        }
    }

    /// Run one invocation on the calling worker, release it and re-arm the task.
    fn execute(&self, worker_id: usize, worker_name: &str, job: &Job) {
        let entry = &job.entry;
        let id = entry.task.id();

        let started = self.clock.now();
        let run = {
            let mut record = entry.record.lock();
            record.last_start = Some(started);
            record.runs += 1;
            record.runs
        };
        self.counters.started.fetch_add(1, Ordering::Relaxed);
        emit(
            self.events.as_deref(),
            build_event(
                EventKind::TaskStarted,
                id,
                Some(worker_name),
                format!("Running task {id} (run {run})"),
                started,
            ),
        );

        let ctx = ExecutionContext::new(
            id,
            worker_id,
            worker_name,
            run,
            job.scheduled_for,
            self.cancellation.clone(),
            Arc::clone(&self.clock),
            self.events.clone(),
        );
        let outcome = entry.task.invoke(&ctx);

        let finished = self.clock.now();
        let record = {
            let mut record = entry.record.lock();
            record.last_completion = Some(finished);
            if outcome.is_err() {
                record.failures += 1;
            }
            *record
        };
        let (kind, message) = match outcome {
            Ok(()) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                let took = until(started, finished);
                (
                    EventKind::TaskCompleted,
                    format!("Task {id} completed in {}ms", took.as_millis()),
                )
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                (EventKind::TaskFailed, e.to_string())
            }
        };
        emit(
            self.events.as_deref(),
            build_event(kind, id, Some(worker_name), message, finished),
        );

        // Clear before re-arming so an already-due next fire is not skipped.
        entry.in_flight.store(false, Ordering::Release);
        self.finish(id);
        self.reschedule(entry, &record);
    }

    /// Compute the next fire time and push it into the timing queue.
    fn reschedule(&self, entry: &Arc<Entry>, record: &ExecutionRecord) {
        if self.cancellation.is_cancelled() {
            return;
        }
        let id = entry.task.id();
        match entry
            .task
            .trigger()
            .next_execution_time(record, self.clock.as_ref())
        {
            Ok(Some(due)) => {
                let mut state = self.timer.lock();
                if state.shutdown {
                    return;
                }
                state.seq += 1;
                let seq = state.seq;
                debug!(task_id = %id, due = %due, "Task armed");
                state.queue.push(Pending {
                    due,
                    seq,
                    entry: Arc::clone(entry),
                });
                drop(state);
                self.timer_cv.notify_one();
            }
            Ok(None) => emit(
                self.events.as_deref(),
                build_event(
                    EventKind::TaskRetired,
                    id,
                    None,
                    format!("Trigger for {id} has no further execution time"),
                    self.clock.now(),
                ),
            ),
            Err(e) => {
                error!(task_id = %id, error = %e, "Trigger computation failed");
                emit(
                    self.events.as_deref(),
                    build_event(
                        EventKind::TaskRetired,
                        id,
                        None,
                        e.for_task(id).to_string(),
                        self.clock.now(),
                    ),
                );
            }
        }
    }

    fn finish(&self, task_id: &str) {
        let mut active = self.active.lock();
        active.remove(task_id);
        if active.is_empty() {
            self.drained.notify_all();
        }
    }
}

/// Timing loop: dispatch everything due, then sleep until the next due time.
fn run_timer(shared: &Shared) {
    debug!("Timer thread started");
    let mut state = shared.timer.lock();
    loop {
        if state.shutdown {
            break;
        }
        let now = shared.clock.now();
        while state.queue.peek().is_some_and(|p| p.due <= now) {
            if let Some(pending) = state.queue.pop() {
                shared.dispatch(pending.entry, pending.due);
            }
        }
        match state.queue.peek().map(|p| until(now, p.due)) {
            Some(wait) => {
                shared.timer_cv.wait_for(&mut state, wait);
            }
            None => shared.timer_cv.wait(&mut state),
        }
    }
    debug!("Timer thread exiting");
}

/// Spawn a worker thread.
fn spawn_worker(
    worker_id: usize,
    jobs_rx: Receiver<Job>,
    shared: Arc<Shared>,
    config: &SchedulerConfig,
) -> Result<JoinHandle<()>, SchedulerError> {
    let name = format!("{}-{worker_id}", config.thread_name_prefix);
    thread::Builder::new()
        .name(name.clone())
        .stack_size(config.thread_stack_size)
        .spawn(move || {
            debug!(worker_id = worker_id, "Worker thread started");
            // When the sender is dropped (stop), recv returns Err and the worker exits.
            while let Ok(job) = jobs_rx.recv() {
                if shared.cancellation.is_cancelled() {
                    job.entry.in_flight.store(false, Ordering::Release);
                    shared.finish(job.entry.task.id());
                    continue;
                }
                shared.execute(worker_id, &name, &job);
            }
            debug!(worker_id = worker_id, "Worker thread exiting");
        })
        .map_err(|e| SchedulerError::Spawn(e.to_string()))
}
