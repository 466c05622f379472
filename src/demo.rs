//! Demo harness: a fixed table of periodic tasks plus two lock-holding tasks.
//!
//! The lock tasks run on a fixed delay and each holds its lock for a long
//! interval. The scheduler never overlaps a task with itself, but nothing
//! serializes distinct tasks that share a lock. The two tasks guard separate
//! lock objects, so only self-contention is visible. Entry and release are
//! reported as `LockEntered` / `LockReleased` events carrying the worker identity.
//!
//! A task blocked in lock acquisition cannot observe cancellation; `stop` will
//! report it as still running.

use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::DemoConfig;
use crate::core::{EventKind, ExecutionContext, SchedulerError, Task, TaskScheduler, Trigger};
use crate::lock::{FairReentrantLock, IntrinsicLock};
use crate::util::clock::offset;

/// Task holding the fair reentrant lock.
pub const REENTRANT_LOCK_TASK: &str = "reentrant_lock_task";
/// Task holding the intrinsic lock.
pub const SYNCHRONIZED_BLOCK_TASK: &str = "synchronized_block_task";
/// Cron heartbeat.
pub const ALIVE_TASK: &str = "alive";
/// Slower cron task.
pub const CRON_TASK: &str = "cron_task";
/// Fixed-delay task.
pub const FIXED_DELAY_TASK: &str = "fixed_delay_task";
/// Fixed-rate task.
pub const FIXED_RATE_TASK: &str = "fixed_rate_task";
/// Custom-trigger task.
pub const CUSTOM_TRIGGER_TASK: &str = "custom_trigger_task";

/// Lock resources shared by the demo tasks.
///
/// Each lock guards the number of times it has been entered.
#[derive(Debug, Clone, Default)]
pub struct SharedLocks {
    /// Fair (FIFO) reentrant lock.
    pub reentrant: Arc<FairReentrantLock<Cell<u64>>>,
    /// Plain per-instance lock.
    pub intrinsic: Arc<IntrinsicLock<u64>>,
}

impl SharedLocks {
    /// Create a fresh pair of locks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Times the reentrant lock has been entered.
    #[must_use]
    pub fn reentrant_entries(&self) -> u64 {
        self.reentrant.with_lock(Cell::get)
    }

    /// Times the intrinsic lock has been entered.
    #[must_use]
    pub fn intrinsic_entries(&self) -> u64 {
        self.intrinsic.synchronized(|n| *n)
    }
}

/// Emits `LockReleased` when dropped, i.e. before the enclosing lock is
/// released, including on unwind.
struct ReleaseNotice<'a> {
    ctx: &'a ExecutionContext,
    lock_name: &'static str,
}

impl Drop for ReleaseNotice<'_> {
    fn drop(&mut self) {
        self.ctx.emit(
            EventKind::LockReleased,
            format!(
                "Worker {} with id {} RELEASED the {}",
                self.ctx.worker_name(),
                self.ctx.worker_id(),
                self.lock_name
            ),
        );
    }
}

fn hold_lock(ctx: &ExecutionContext, lock_name: &'static str, hold: Duration) {
    ctx.emit(
        EventKind::LockEntered,
        format!(
            "Worker {} with id {} ENTERED the {lock_name}",
            ctx.worker_name(),
            ctx.worker_id()
        ),
    );
    let _release = ReleaseNotice { ctx, lock_name };
    if !ctx.sleep(hold) {
        debug!(task_id = ctx.task_id(), "Lock hold cut short by shutdown");
    }
}

/// Body of the reentrant-lock task.
pub fn reentrant_lock_action(
    locks: &SharedLocks,
    hold: Duration,
) -> impl Fn(&ExecutionContext) -> anyhow::Result<()> + Send + Sync + 'static {
    let lock = Arc::clone(&locks.reentrant);
    move |ctx: &ExecutionContext| {
        lock.with_lock(|entries| {
            entries.set(entries.get() + 1);
            hold_lock(ctx, "re-entrant lock", hold);
        });
        Ok(())
    }
}

/// Body of the intrinsic-lock task.
pub fn synchronized_block_action(
    locks: &SharedLocks,
    hold: Duration,
) -> impl Fn(&ExecutionContext) -> anyhow::Result<()> + Send + Sync + 'static {
    let lock = Arc::clone(&locks.intrinsic);
    move |ctx: &ExecutionContext| {
        lock.synchronized(|entries| {
            *entries += 1;
            hold_lock(ctx, "synchronized lock", hold);
        });
        Ok(())
    }
}

/// Custom policy: first fire `first` after scheduling, then `gap` after each
/// completion.
#[must_use]
pub fn demo_custom_trigger(first: Duration, gap: Duration) -> Trigger {
    Trigger::custom(move |record, now| match record.last_completion {
        None => offset(now, first),
        Some(done) => offset(done, gap),
    })
}

/// The full demo task table.
///
/// # Errors
///
/// Returns `SchedulerError::TriggerComputation` if a configured cron
/// expression does not parse.
pub fn demo_tasks(cfg: &DemoConfig, locks: &SharedLocks) -> Result<Vec<Task>, SchedulerError> {
    let lock_delay = Duration::from_millis(cfg.lock_task_delay_ms);
    let work = Duration::from_millis(cfg.fixed_delay_work_ms);

    Ok(vec![
        Task::new(
            REENTRANT_LOCK_TASK,
            reentrant_lock_action(locks, cfg.hold()),
            Trigger::fixed_delay(lock_delay),
        ),
        Task::new(
            SYNCHRONIZED_BLOCK_TASK,
            synchronized_block_action(locks, cfg.hold()),
            Trigger::fixed_delay(lock_delay),
        ),
        Task::new(
            ALIVE_TASK,
            |ctx| {
                info!(
                    task_id = ctx.task_id(),
                    worker = ctx.worker_name(),
                    run = ctx.run(),
                    "alive task"
                );
                Ok(())
            },
            Trigger::cron(cfg.alive_cron.as_str()).map_err(|e| e.for_task(ALIVE_TASK))?,
        ),
        Task::new(
            CRON_TASK,
            |ctx| {
                info!(task_id = ctx.task_id(), worker = ctx.worker_name(), "Running CRON task");
                Ok(())
            },
            Trigger::cron(cfg.cron_task_cron.as_str()).map_err(|e| e.for_task(CRON_TASK))?,
        ),
        Task::new(
            FIXED_DELAY_TASK,
            move |ctx| {
                info!(task_id = ctx.task_id(), worker = ctx.worker_name(), "Running FIXED_DELAY task");
                let _ = ctx.sleep(work);
                Ok(())
            },
            Trigger::fixed_delay(Duration::from_millis(cfg.fixed_delay_ms)),
        ),
        Task::new(
            FIXED_RATE_TASK,
            |ctx| {
                info!(task_id = ctx.task_id(), worker = ctx.worker_name(), "Running FIXED_RATE task");
                Ok(())
            },
            Trigger::fixed_rate(Duration::from_millis(cfg.fixed_rate_ms))
                .with_initial_delay(Duration::from_millis(cfg.fixed_rate_initial_delay_ms)),
        ),
        Task::new(
            CUSTOM_TRIGGER_TASK,
            |ctx| {
                info!(task_id = ctx.task_id(), worker = ctx.worker_name(), "Running CUSTOM trigger task");
                Ok(())
            },
            demo_custom_trigger(
                Duration::from_millis(cfg.custom_first_ms),
                Duration::from_millis(cfg.custom_gap_ms),
            ),
        ),
    ])
}

/// Register the demo task table on `scheduler`.
///
/// # Errors
///
/// Returns the first trigger or registration error.
pub fn register_demo_tasks(
    scheduler: &TaskScheduler,
    cfg: &DemoConfig,
    locks: &SharedLocks,
) -> Result<(), SchedulerError> {
    for task in demo_tasks(cfg, locks)? {
        scheduler.register_task(task)?;
    }
    Ok(())
}
