//! # Prometheus Cadence
//!
//! A periodic task scheduler with pluggable trigger policies.
//!
//! Tasks are registered against exactly one [`Trigger`](core::Trigger) and run
//! on a fixed pool of worker threads. A dedicated timing thread sleeps until the
//! next task is due, so long-running task bodies never delay the schedule of
//! other tasks.
//!
//! ## Key Features
//!
//! - **Trigger Policies**: fixed delay, fixed rate, cron (5 or 6 fields) and custom functions
//! - **No Self-Overlap**: a task never runs concurrently with itself
//! - **Contained Failures**: errors and panics in a task are logged; the schedule continues
//! - **Cooperative Shutdown**: `stop(timeout)` reports tasks that did not finish in time
//! - **Injectable Clock and Events**: deterministic trigger tests and observable event streams
//!
//! ## Example
//!
//! ```rust,ignore
//! use prometheus_cadence::config::SchedulerConfig;
//! use prometheus_cadence::core::{TaskScheduler, Trigger};
//! use std::time::Duration;
//!
//! let scheduler = TaskScheduler::new(SchedulerConfig::new().with_worker_count(4))?;
//! scheduler.register("alive", |_ctx| Ok(()), Trigger::cron("*/2 * * * * *")?)?;
//! scheduler.register(
//!     "sync",
//!     |ctx| {
//!         tracing::info!(worker = ctx.worker_name(), "syncing");
//!         Ok(())
//!     },
//!     Trigger::fixed_delay(Duration::from_secs(2)),
//! )?;
//! scheduler.start()?;
//! // ...
//! let report = scheduler.stop(Duration::from_secs(30));
//! report.ensure_drained()?;
//! ```
//!
//! The [`demo`] module registers the full demonstration table, including two
//! tasks that hold a lock for a long interval to show contention.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: triggers, tasks, scheduler, events.
pub mod core;
/// Configuration models for the scheduler, triggers and the demo.
pub mod config;
/// Builders to construct a scheduler from configuration.
pub mod builders;
/// Demo task table and mutual-exclusion tasks.
pub mod demo;
/// Fair reentrant and intrinsic locks.
pub mod lock;
/// Shared utilities.
pub mod util;
