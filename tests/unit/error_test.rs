//! Tests for error types

use prometheus_cadence::core::SchedulerError;

#[test]
fn test_duplicate_task_error() {
    let err = SchedulerError::DuplicateTask("alive".to_string());
    assert_eq!(format!("{}", err), "duplicate task: alive");
}

#[test]
fn test_task_execution_error() {
    let err = SchedulerError::TaskExecution {
        task_id: "report".to_string(),
        message: "disk full".to_string(),
    };
    assert_eq!(format!("{}", err), "task `report` failed: disk full");
}

#[test]
fn test_trigger_computation_error() {
    let err = SchedulerError::TriggerComputation {
        task_id: "cron_task".to_string(),
        reason: "bad field".to_string(),
    };
    assert_eq!(
        format!("{}", err),
        "trigger for `cron_task` cannot compute next execution: bad field"
    );
}

#[test]
fn test_cancellation_timeout_lists_tasks() {
    let err = SchedulerError::CancellationTimeout {
        still_running: vec!["a".to_string(), "b".to_string()],
    };
    assert_eq!(
        format!("{}", err),
        "stop timed out with tasks still in flight: a, b"
    );
}

#[test]
fn test_lifecycle_errors() {
    assert_eq!(
        format!("{}", SchedulerError::AlreadyStarted),
        "scheduler already started"
    );
    assert_eq!(
        format!("{}", SchedulerError::Shutdown),
        "scheduler has been shut down"
    );
}

#[test]
fn test_for_task_only_fills_unbound_trigger_errors() {
    let bound = SchedulerError::TriggerComputation {
        task_id: "first".to_string(),
        reason: "r".to_string(),
    };
    assert_eq!(bound.clone().for_task("second"), bound);

    let other = SchedulerError::Shutdown;
    assert_eq!(other.clone().for_task("x"), other);
}

#[test]
fn test_unbound_trigger_error_gets_task_id() {
    let err = prometheus_cadence::core::Trigger::cron("nope").unwrap_err();
    match err.for_task("alive") {
        SchedulerError::TriggerComputation { task_id, .. } => assert_eq!(task_id, "alive"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_error_converts_to_anyhow() {
    fn fails() -> prometheus_cadence::core::AppResult<()> {
        Err(SchedulerError::InvalidConfig("worker_count must be greater than 0".into()).into())
    }
    let err = fails().unwrap_err();
    assert!(err.to_string().contains("worker_count"));
}
