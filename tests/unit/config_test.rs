//! Tests for configuration validation

use prometheus_cadence::config::{DemoConfig, SchedulerConfig, TriggerConfig};
use prometheus_cadence::core::{CronZone, Trigger};
use std::time::Duration;

#[test]
fn test_scheduler_config_validation() {
    let valid = SchedulerConfig {
        worker_count: 4,
        thread_stack_size: 1024 * 1024,
        thread_name_prefix: "jobs".to_string(),
        stop_timeout_ms: 5_000,
    };
    assert!(valid.validate().is_ok());
}

#[test]
fn test_scheduler_config_invalid_worker_count() {
    let invalid = SchedulerConfig::new().with_worker_count(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_stack_size() {
    let invalid = SchedulerConfig::new().with_thread_stack_size(1024);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_prefix() {
    let invalid = SchedulerConfig::new().with_thread_name_prefix("  ");
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_from_json_uses_defaults() {
    let cfg = SchedulerConfig::from_json_str(r#"{"worker_count": 3}"#).unwrap();
    assert_eq!(cfg.worker_count, 3);
    assert_eq!(cfg.thread_name_prefix, "cadence-worker");
    assert_eq!(cfg.stop_timeout(), Duration::from_secs(30));
}

#[test]
fn test_scheduler_config_from_json_rejects_invalid() {
    assert!(SchedulerConfig::from_json_str(r#"{"worker_count": 0}"#).is_err());
    assert!(SchedulerConfig::from_json_str("not json").is_err());
}

#[test]
fn test_trigger_config_serde() {
    let json = r#"[
        {"type": "fixed_delay", "delay_ms": 2000},
        {"type": "fixed_rate", "period_ms": 2000, "initial_delay_ms": 100},
        {"type": "cron", "expression": "*/5 * * * * *"}
    ]"#;
    let parsed: Vec<TriggerConfig> = serde_json::from_str(json).unwrap();
    assert_eq!(
        parsed[0],
        TriggerConfig::FixedDelay {
            delay_ms: 2_000,
            initial_delay_ms: 0
        }
    );

    let triggers: Vec<Trigger> = parsed.iter().map(|t| t.build().unwrap()).collect();
    assert_eq!(triggers[0].kind(), "fixed_delay");
    assert!(matches!(
        triggers[1],
        Trigger::FixedRate { period, initial_delay }
            if period == Duration::from_secs(2) && initial_delay == Duration::from_millis(100)
    ));
    assert_eq!(triggers[2].kind(), "cron");
}

#[test]
fn test_trigger_config_rejects_bad_cron() {
    let cfg = TriggerConfig::Cron {
        expression: "every tuesday".to_string(),
        zone: CronZone::Local,
    };
    assert!(cfg.build().is_err());
}

#[test]
fn test_demo_config_defaults() {
    let cfg = DemoConfig::default();
    assert_eq!(cfg.hold(), Duration::from_secs(120));
    assert_eq!(cfg.lock_task_delay_ms, 10_000);
    assert_eq!(cfg.alive_cron, "*/2 * * * * *");
    assert_eq!(cfg.cron_task_cron, "*/5 * * * * *");
    assert_eq!(cfg.run_for(), Duration::from_secs(300));
}

#[test]
fn test_demo_config_partial_json() {
    let cfg: DemoConfig = serde_json::from_str(r#"{"hold_ms": 500}"#).unwrap();
    assert_eq!(cfg.hold(), Duration::from_millis(500));
    assert_eq!(cfg.fixed_rate_ms, 2_000);
}
