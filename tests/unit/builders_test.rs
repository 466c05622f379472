//! Tests for scheduler builders

use prometheus_cadence::builders::{build_scheduler, SchedulerBuilder, TaskRow, TaskTable};
use prometheus_cadence::config::{SchedulerConfig, TriggerConfig};
use prometheus_cadence::core::{CronZone, ExecutionContext, SchedulerError, TaskAction, Trigger};
use std::sync::Arc;
use std::time::Duration;

const TABLE: &str = r#"{
    "scheduler": {"worker_count": 2, "thread_name_prefix": "table"},
    "tasks": [
        {"id": "alive", "trigger": {"type": "cron", "expression": "*/2 * * * * *"}},
        {"id": "poll", "trigger": {"type": "fixed_delay", "delay_ms": 2000}},
        {"id": "tick", "trigger": {"type": "fixed_rate", "period_ms": 500}}
    ]
}"#;

fn noop(_row: &TaskRow) -> Result<TaskAction, SchedulerError> {
    Ok(Arc::new(|_ctx: &ExecutionContext| -> anyhow::Result<()> { Ok(()) }))
}

#[test]
fn test_task_table_from_json() {
    let table = TaskTable::from_json_str(TABLE).unwrap();
    assert_eq!(table.scheduler.worker_count, 2);
    assert_eq!(table.tasks.len(), 3);
    assert_eq!(table.tasks[0].id, "alive");
}

#[test]
fn test_task_table_rejects_invalid_scheduler() {
    let bad = r#"{"scheduler": {"worker_count": 0}, "tasks": []}"#;
    assert!(TaskTable::from_json_str(bad).is_err());
}

#[test]
fn test_build_scheduler_registers_every_row() {
    let table = TaskTable::from_json_str(TABLE).unwrap();
    let scheduler = build_scheduler(&table, noop).unwrap();
    assert_eq!(scheduler.task_ids(), vec!["alive", "poll", "tick"]);
    assert_eq!(scheduler.config().thread_name_prefix, "table");
    assert!(!scheduler.is_running());
}

#[test]
fn test_build_scheduler_reports_bad_row() {
    let mut table = TaskTable::from_json_str(TABLE).unwrap();
    table.tasks.push(TaskRow {
        id: "broken".to_string(),
        trigger: TriggerConfig::Cron {
            expression: "* *".to_string(),
            zone: CronZone::Local,
        },
    });
    let err = build_scheduler(&table, noop).err().unwrap();
    assert!(matches!(
        err,
        SchedulerError::TriggerComputation { ref task_id, .. } if task_id == "broken"
    ));
}

#[test]
fn test_build_scheduler_propagates_factory_error() {
    let table = TaskTable::from_json_str(TABLE).unwrap();
    let err = build_scheduler(&table, |row| {
        Err(SchedulerError::InvalidConfig(format!("no action for {}", row.id)))
    })
    .err()
    .unwrap();
    assert_eq!(err, SchedulerError::InvalidConfig("no action for alive".into()));
}

#[test]
fn test_scheduler_builder() {
    let scheduler = SchedulerBuilder::new(SchedulerConfig::new().with_worker_count(1))
        .task("a", |_ctx| Ok(()), Trigger::fixed_delay(Duration::from_secs(1)))
        .configured_task(
            "b",
            |_ctx| Ok(()),
            &TriggerConfig::FixedRate {
                period_ms: 100,
                initial_delay_ms: 0,
            },
        )
        .build()
        .unwrap();
    assert_eq!(scheduler.task_ids(), vec!["a", "b"]);
    assert_eq!(scheduler.stats().worker_count, 1);
}

#[test]
fn test_scheduler_builder_defers_errors_to_build() {
    let result = SchedulerBuilder::new(SchedulerConfig::new())
        .task("a", |_ctx| Ok(()), Trigger::fixed_delay(Duration::from_secs(1)))
        .task("a", |_ctx| Ok(()), Trigger::fixed_delay(Duration::from_secs(1)))
        .build();
    assert_eq!(result.err(), Some(SchedulerError::DuplicateTask("a".into())));
}
