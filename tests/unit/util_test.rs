//! Tests for utility functions

use chrono::{TimeZone, Utc};
use prometheus_cadence::util::{offset, until, Clock, ManualClock, SystemClock};
use std::time::Duration;

#[test]
fn test_manual_clock_set_and_advance() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    assert_eq!(clock.now(), start);

    clock.advance(Duration::from_millis(1_500));
    assert_eq!(clock.now(), start + chrono::Duration::milliseconds(1_500));

    let later = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    clock.set(later);
    assert_eq!(clock.now(), later);
}

#[test]
fn test_system_clock_moves_forward() {
    let a = SystemClock.now();
    std::thread::sleep(Duration::from_millis(2));
    assert!(SystemClock.now() > a);
}

#[test]
fn test_offset_and_until() {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let later = offset(at, Duration::from_secs(2)).unwrap();
    assert_eq!(until(at, later), Duration::from_secs(2));
    assert_eq!(until(later, at), Duration::ZERO);
    assert!(offset(at, Duration::MAX).is_none());
}
