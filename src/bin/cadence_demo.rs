//! Runs the demo task table until `CADENCE_DEMO_RUN_SECS` elapses, then stops.

use std::thread;

use prometheus_cadence::config::{DemoConfig, SchedulerConfig};
use prometheus_cadence::core::{AppResult, TaskScheduler};
use prometheus_cadence::demo::{register_demo_tasks, SharedLocks};
use prometheus_cadence::util::init_tracing;
use tracing::{info, warn};

fn main() -> AppResult<()> {
    init_tracing();

    let config = SchedulerConfig::from_env().map_err(anyhow::Error::msg)?;
    let demo = DemoConfig::from_env().map_err(anyhow::Error::msg)?;
    let locks = SharedLocks::new();

    let scheduler = TaskScheduler::new(config)?;
    register_demo_tasks(&scheduler, &demo, &locks)?;
    scheduler.start()?;
    info!(
        run_secs = demo.run_secs,
        hold_ms = demo.hold_ms,
        tasks = scheduler.task_ids().len(),
        "Demo harness running"
    );

    thread::sleep(demo.run_for());

    let report = scheduler.stop(scheduler.config().stop_timeout());
    if let Err(e) = report.ensure_drained() {
        warn!(error = %e, "Demo stopped with tasks still running");
    }
    let stats = scheduler.stats();
    info!(
        started = stats.started_runs,
        completed = stats.completed_runs,
        failed = stats.failed_runs,
        reentrant_entries = locks.reentrant_entries(),
        intrinsic_entries = locks.intrinsic_entries(),
        "Demo harness finished"
    );
    Ok(())
}
