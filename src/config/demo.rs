//! Demo harness configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::scheduler::env_parse;

/// Timings for the demo task table. Defaults reproduce the classic harness:
/// lock tasks every 10s holding for 120s, cron tasks every 2s and 5s, and
/// fixed-delay/fixed-rate tasks every 2s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// How long each lock task holds its lock.
    pub hold_ms: u64,
    /// Fixed delay between runs of each lock task.
    pub lock_task_delay_ms: u64,
    /// Cron expression of the `alive` task.
    pub alive_cron: String,
    /// Cron expression of the `cron_task` task.
    pub cron_task_cron: String,
    /// Fixed delay of `fixed_delay_task`.
    pub fixed_delay_ms: u64,
    /// Simulated work inside `fixed_delay_task`.
    pub fixed_delay_work_ms: u64,
    /// Period of `fixed_rate_task`.
    pub fixed_rate_ms: u64,
    /// Initial delay of `fixed_rate_task`.
    pub fixed_rate_initial_delay_ms: u64,
    /// First fire of the custom task, relative to scheduling time.
    pub custom_first_ms: u64,
    /// Gap after each completion of the custom task.
    pub custom_gap_ms: u64,
    /// How long the demo binary runs before stopping.
    pub run_secs: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            hold_ms: 120_000,
            lock_task_delay_ms: 10_000,
            alive_cron: "*/2 * * * * *".to_string(),
            cron_task_cron: "*/5 * * * * *".to_string(),
            fixed_delay_ms: 2_000,
            fixed_delay_work_ms: 50,
            fixed_rate_ms: 2_000,
            fixed_rate_initial_delay_ms: 100,
            custom_first_ms: 1_000,
            custom_gap_ms: 2_000,
            run_secs: 300,
        }
    }
}

impl DemoConfig {
    /// Lock hold duration.
    #[must_use]
    pub const fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    /// Demo run duration.
    #[must_use]
    pub const fn run_for(&self) -> Duration {
        Duration::from_secs(self.run_secs)
    }

    /// Defaults overridden by `CADENCE_DEMO_HOLD_MS`, `CADENCE_DEMO_LOCK_DELAY_MS`
    /// and `CADENCE_DEMO_RUN_SECS`.
    ///
    /// # Errors
    ///
    /// Returns a message when a variable does not parse.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Some(v) = env_parse("CADENCE_DEMO_HOLD_MS")? {
            cfg.hold_ms = v;
        }
        if let Some(v) = env_parse("CADENCE_DEMO_LOCK_DELAY_MS")? {
            cfg.lock_task_delay_ms = v;
        }
        if let Some(v) = env_parse("CADENCE_DEMO_RUN_SECS")? {
            cfg.run_secs = v;
        }
        Ok(cfg)
    }
}
