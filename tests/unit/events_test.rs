//! Tests for scheduler events and the in-memory sink

use chrono::Utc;
use prometheus_cadence::core::{build_event, EventKind, EventSink, InMemoryEventSink};
use tracing::Level;

#[test]
fn test_event_levels() {
    assert_eq!(EventKind::TaskFailed.level(), Level::ERROR);
    assert_eq!(EventKind::CancellationTimeout.level(), Level::WARN);
    assert_eq!(EventKind::LockEntered.level(), Level::INFO);
    assert_eq!(EventKind::TaskStarted.level(), Level::DEBUG);
}

#[test]
fn test_build_event() {
    let at = Utc::now();
    let event = build_event(
        EventKind::LockEntered,
        "reentrant_lock_task",
        Some("cadence-worker-1"),
        "Worker cadence-worker-1 with id 1 ENTERED the re-entrant lock",
        at,
    );
    assert_eq!(event.task_id, "reentrant_lock_task");
    assert_eq!(event.worker.as_deref(), Some("cadence-worker-1"));
    assert_eq!(event.level, Level::INFO);
    assert_eq!(event.at, at);
    assert!(!event.event_id.is_empty());
}

#[test]
fn test_event_ids_are_unique() {
    let a = build_event(EventKind::TaskStarted, "t", None, "", Utc::now());
    let b = build_event(EventKind::TaskStarted, "t", None, "", Utc::now());
    assert_ne!(a.event_id, b.event_id);
}

#[test]
fn test_sink_filters_by_task_and_kind() {
    let sink = InMemoryEventSink::new(10);
    assert!(sink.is_empty());
    let now = Utc::now();
    sink.record(build_event(EventKind::TaskStarted, "a", None, "", now));
    sink.record(build_event(EventKind::TaskCompleted, "a", None, "", now));
    sink.record(build_event(EventKind::TaskStarted, "b", None, "", now));

    assert_eq!(sink.len(), 3);
    assert_eq!(sink.events_for("a").len(), 2);
    assert_eq!(sink.instants("b", EventKind::TaskStarted), vec![now]);
    assert!(sink.instants("b", EventKind::TaskCompleted).is_empty());
}

#[test]
fn test_sink_drops_oldest_when_full() {
    let sink = InMemoryEventSink::new(2);
    for task in ["first", "second", "third"] {
        sink.record(build_event(EventKind::TaskStarted, task, None, "", Utc::now()));
    }
    let ids: Vec<String> = sink.events().into_iter().map(|e| e.task_id).collect();
    assert_eq!(ids, vec!["second", "third"]);
}
