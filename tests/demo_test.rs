//! End-to-end tests for the demo task table
//!
//! Runs the full table with shortened timings and validates:
//! - every task fires and none fails
//! - long lock holds end promptly on cooperative shutdown
//! - lock events carry worker identity

use prometheus_cadence::config::{DemoConfig, SchedulerConfig};
use prometheus_cadence::core::{EventKind, EventSink, InMemoryEventSink, TaskScheduler};
use prometheus_cadence::demo::{
    register_demo_tasks, SharedLocks, ALIVE_TASK, CRON_TASK, CUSTOM_TRIGGER_TASK,
    FIXED_DELAY_TASK, FIXED_RATE_TASK, REENTRANT_LOCK_TASK, SYNCHRONIZED_BLOCK_TASK,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn fast_demo() -> DemoConfig {
    DemoConfig {
        hold_ms: 100,
        lock_task_delay_ms: 50,
        alive_cron: "* * * * * *".into(),
        cron_task_cron: "* * * * * *".into(),
        fixed_delay_ms: 100,
        fixed_delay_work_ms: 10,
        fixed_rate_ms: 100,
        fixed_rate_initial_delay_ms: 10,
        custom_first_ms: 50,
        custom_gap_ms: 100,
        run_secs: 1,
    }
}

fn demo_scheduler(cfg: &DemoConfig, locks: &SharedLocks) -> (TaskScheduler, Arc<InMemoryEventSink>) {
    let sink = Arc::new(InMemoryEventSink::new(10_000));
    let events: Arc<dyn EventSink> = sink.clone();
    let scheduler = TaskScheduler::new(
        SchedulerConfig::new()
            .with_worker_count(4)
            .with_thread_name_prefix("demo"),
    )
    .unwrap()
    .with_event_sink(events);
    register_demo_tasks(&scheduler, cfg, locks).unwrap();
    (scheduler, sink)
}

#[test]
fn test_demo_table_runs_every_task() {
    let cfg = fast_demo();
    let locks = SharedLocks::new();
    let (scheduler, sink) = demo_scheduler(&cfg, &locks);
    assert_eq!(scheduler.task_ids().len(), 7);

    scheduler.start().unwrap();
    thread::sleep(Duration::from_millis(2_500));
    assert!(scheduler.stop(Duration::from_secs(2)).is_clean());

    for id in [
        REENTRANT_LOCK_TASK,
        SYNCHRONIZED_BLOCK_TASK,
        ALIVE_TASK,
        CRON_TASK,
        FIXED_DELAY_TASK,
        FIXED_RATE_TASK,
        CUSTOM_TRIGGER_TASK,
    ] {
        let record = scheduler.record(id).unwrap();
        assert!(record.runs >= 1, "{id} never ran");
        assert_eq!(record.failures, 0, "{id} failed");
    }
    assert!(locks.reentrant_entries() >= 2);
    assert!(locks.intrinsic_entries() >= 2);
    assert_eq!(scheduler.stats().failed_runs, 0);

    let entered = sink
        .events_for(REENTRANT_LOCK_TASK)
        .into_iter()
        .find(|e| e.kind == EventKind::LockEntered)
        .expect("lock entry event");
    let worker = entered.worker.expect("worker name");
    assert!(worker.starts_with("demo-"), "worker {worker}");
    assert!(entered.message.starts_with(&format!("Worker {worker} with id ")));
}

#[test]
fn test_long_lock_holds_end_on_stop() {
    let cfg = DemoConfig {
        lock_task_delay_ms: 10,
        ..DemoConfig::default()
    };
    let locks = SharedLocks::new();
    let (scheduler, sink) = demo_scheduler(&cfg, &locks);
    scheduler.start().unwrap();

    // Wait until both lock tasks hold their two-minute locks.
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline
        && (sink.instants(REENTRANT_LOCK_TASK, EventKind::LockEntered).is_empty()
            || sink.instants(SYNCHRONIZED_BLOCK_TASK, EventKind::LockEntered).is_empty())
    {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(scheduler.stats().in_flight_tasks >= 2);

    let report = scheduler.stop(Duration::from_secs(5));
    assert!(report.is_clean());
    assert!(report.elapsed < Duration::from_secs(1), "{:?}", report.elapsed);

    for id in [REENTRANT_LOCK_TASK, SYNCHRONIZED_BLOCK_TASK] {
        assert_eq!(sink.instants(id, EventKind::LockEntered).len(), 1);
        assert_eq!(sink.instants(id, EventKind::LockReleased).len(), 1);
    }
}
