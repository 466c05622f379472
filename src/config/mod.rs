//! Configuration models for the scheduler, triggers and the demo harness.

pub mod demo;
pub mod scheduler;

pub use demo::DemoConfig;
pub use scheduler::{SchedulerConfig, TriggerConfig};
