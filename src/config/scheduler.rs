//! Scheduler and trigger configuration structures.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{CronZone, SchedulerError, Trigger};

/// Default stack size for worker threads (2 MiB).
pub const DEFAULT_THREAD_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Default grace period for `stop`.
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 30_000;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of worker threads shared by all tasks.
    pub worker_count: usize,
    /// Stack size for each worker thread, in bytes.
    pub thread_stack_size: usize,
    /// Worker threads are named `{prefix}-{index}`; the timing thread `{prefix}-timer`.
    pub thread_name_prefix: String,
    /// Grace period used by callers that stop with the configured timeout.
    pub stop_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(2),
            thread_stack_size: DEFAULT_THREAD_STACK_SIZE,
            thread_name_prefix: "cadence-worker".to_string(),
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
        }
    }
}

impl SchedulerConfig {
    /// Configuration with defaults: one worker per CPU (at least two).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the worker thread stack size in bytes.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Set the thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the default stop timeout.
    #[must_use]
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Default stop timeout as a `Duration`.
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate. Missing fields
    /// take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a message on parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `CADENCE_*` environment variables, loading a
    /// `.env` file first if one exists. Unset variables take their defaults.
    ///
    /// Recognized: `CADENCE_WORKER_COUNT`, `CADENCE_THREAD_STACK_SIZE`,
    /// `CADENCE_THREAD_PREFIX`, `CADENCE_STOP_TIMEOUT_MS`.
    ///
    /// # Errors
    ///
    /// Returns a message when a variable does not parse or validation fails.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Some(v) = env_parse::<usize>("CADENCE_WORKER_COUNT")? {
            cfg.worker_count = v;
        }
        if let Some(v) = env_parse::<usize>("CADENCE_THREAD_STACK_SIZE")? {
            cfg.thread_stack_size = v;
        }
        if let Ok(v) = env::var("CADENCE_THREAD_PREFIX") {
            cfg.thread_name_prefix = v;
        }
        if let Some(v) = env_parse::<u64>("CADENCE_STOP_TIMEOUT_MS")? {
            cfg.stop_timeout_ms = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Read and parse an optional environment variable.
pub(crate) fn env_parse<T>(key: &str) -> Result<Option<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("{key}={raw}: {e}")),
        Err(_) => Ok(None),
    }
}

/// Declarative trigger description, for static task tables and JSON config.
///
/// Custom triggers carry code and can only be built programmatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// Fixed delay between completion and next start.
    FixedDelay {
        /// Delay in milliseconds.
        delay_ms: u64,
        /// Initial delay in milliseconds.
        #[serde(default)]
        initial_delay_ms: u64,
    },
    /// Fixed period between starts.
    FixedRate {
        /// Period in milliseconds.
        period_ms: u64,
        /// Initial delay in milliseconds.
        #[serde(default)]
        initial_delay_ms: u64,
    },
    /// Cron expression, 5 or 6 fields or a macro such as `@daily`.
    Cron {
        /// The expression.
        expression: String,
        /// Zone the expression is matched in; local time when omitted.
        #[serde(default)]
        zone: CronZone,
    },
}

impl TriggerConfig {
    /// Build the runtime trigger.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::TriggerComputation` for an invalid cron expression
    /// or a zero delay/period.
    pub fn build(&self) -> Result<Trigger, SchedulerError> {
        let trigger = match self {
            Self::FixedDelay {
                delay_ms,
                initial_delay_ms,
            } => Trigger::fixed_delay(Duration::from_millis(*delay_ms))
                .with_initial_delay(Duration::from_millis(*initial_delay_ms)),
            Self::FixedRate {
                period_ms,
                initial_delay_ms,
            } => Trigger::fixed_rate(Duration::from_millis(*period_ms))
                .with_initial_delay(Duration::from_millis(*initial_delay_ms)),
            Self::Cron { expression, zone } => Trigger::cron_in(expression.as_str(), *zone)?,
        };
        trigger.validate()?;
        Ok(trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = SchedulerConfig::new();
        assert!(cfg.worker_count >= 2);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let cfg = SchedulerConfig::new()
            .with_worker_count(3)
            .with_thread_name_prefix("jobs")
            .with_stop_timeout(Duration::from_secs(2));
        assert_eq!(cfg.worker_count, 3);
        assert_eq!(cfg.thread_name_prefix, "jobs");
        assert_eq!(cfg.stop_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_cron_config_zone_defaults_to_local() {
        let cfg: TriggerConfig =
            serde_json::from_str(r#"{"type": "cron", "expression": "0 0 9 * * *"}"#).unwrap();
        assert_eq!(
            cfg,
            TriggerConfig::Cron {
                expression: "0 0 9 * * *".into(),
                zone: CronZone::Local,
            }
        );

        let utc: TriggerConfig = serde_json::from_str(
            r#"{"type": "cron", "expression": "@hourly", "zone": "utc"}"#,
        )
        .unwrap();
        match utc.build().unwrap() {
            Trigger::Cron(cron) => assert_eq!(cron.zone(), CronZone::Utc),
            other => panic!("expected cron trigger, got {other:?}"),
        }
    }

    #[test]
    fn test_trigger_config_rejects_zero_period() {
        let cfg = TriggerConfig::FixedRate {
            period_ms: 0,
            initial_delay_ms: 0,
        };
        assert!(matches!(
            cfg.build(),
            Err(SchedulerError::TriggerComputation { .. })
        ));
    }
}
