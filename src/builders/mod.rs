//! Builders to construct a scheduler from configuration and a static task table.

pub mod scheduler_builder;

pub use scheduler_builder::{build_scheduler, SchedulerBuilder, TaskRow, TaskTable};
