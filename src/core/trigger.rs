//! Trigger policies - compute when a task runs next.
//!
//! Supports four policies:
//! - FixedDelay: anchored to the previous completion plus a gap
//! - FixedRate: anchored to the previous start plus a period
//! - Cron: calendar schedule, 6 fields (with seconds) or 5 fields, evaluated
//!   in the local time zone unless told otherwise
//! - Custom: arbitrary user function over the execution record

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};

use crate::core::{ExecutionRecord, SchedulerError};
use crate::util::clock::{offset, Clock};

/// Signature of a custom trigger policy: `(record, now) -> next`.
///
/// Returning `None` retires the task.
pub type TriggerPolicy =
    dyn Fn(&ExecutionRecord, DateTime<Utc>) -> Option<DateTime<Utc>> + Send + Sync;

/// Policy that decides the next execution instant of a task.
#[derive(Clone)]
pub enum Trigger {
    /// Run `delay` after the previous run completed.
    FixedDelay {
        /// Gap between a completion and the next start.
        delay: Duration,
        /// Wait before the first run.
        initial_delay: Duration,
    },
    /// Run every `period`, measured start to start.
    FixedRate {
        /// Distance between consecutive starts.
        period: Duration,
        /// Wait before the first run.
        initial_delay: Duration,
    },
    /// Run whenever the cron expression matches.
    Cron(CronTrigger),
    /// Run whenever a user policy says so.
    Custom(CustomTrigger),
}

impl Trigger {
    /// Create a fixed-delay trigger with no initial delay.
    #[must_use]
    pub const fn fixed_delay(delay: Duration) -> Self {
        Self::FixedDelay {
            delay,
            initial_delay: Duration::ZERO,
        }
    }

    /// Create a fixed-rate trigger with no initial delay.
    #[must_use]
    pub const fn fixed_rate(period: Duration) -> Self {
        Self::FixedRate {
            period,
            initial_delay: Duration::ZERO,
        }
    }

    /// Parse a cron trigger evaluated in the local time zone.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::TriggerComputation` when the expression does not parse.
    pub fn cron(expression: impl Into<String>) -> Result<Self, SchedulerError> {
        CronTrigger::parse(expression).map(Self::Cron)
    }

    /// Parse a cron trigger evaluated in `zone`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::TriggerComputation` when the expression does not
    /// parse or the offset is out of range.
    pub fn cron_in(expression: impl Into<String>, zone: CronZone) -> Result<Self, SchedulerError> {
        CronTrigger::parse_in(expression, zone).map(Self::Cron)
    }

    /// Wrap a custom policy.
    pub fn custom<F>(policy: F) -> Self
    where
        F: Fn(&ExecutionRecord, DateTime<Utc>) -> Option<DateTime<Utc>> + Send + Sync + 'static,
    {
        Self::Custom(CustomTrigger::new(policy))
    }

    /// Set the initial delay of a fixed-delay or fixed-rate trigger.
    /// Other policies are returned unchanged.
    #[must_use]
    pub fn with_initial_delay(self, initial: Duration) -> Self {
        match self {
            Self::FixedDelay { delay, .. } => Self::FixedDelay {
                delay,
                initial_delay: initial,
            },
            Self::FixedRate { period, .. } => Self::FixedRate {
                period,
                initial_delay: initial,
            },
            other => other,
        }
    }

    /// Reject triggers that could never make progress.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::TriggerComputation` for a zero delay or period.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        match self {
            Self::FixedDelay { delay, .. } if delay.is_zero() => {
                Err(SchedulerError::trigger("fixed delay must be greater than 0"))
            }
            Self::FixedRate { period, .. } if period.is_zero() => {
                Err(SchedulerError::trigger("fixed rate period must be greater than 0"))
            }
            _ => Ok(()),
        }
    }

    /// Compute the next execution instant.
    ///
    /// `Ok(None)` means the trigger will never fire again.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::TriggerComputation` when the instant overflows
    /// the calendar.
    pub fn next_execution_time(
        &self,
        record: &ExecutionRecord,
        clock: &dyn Clock,
    ) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        let now = clock.now();
        match self {
            Self::FixedDelay {
                delay,
                initial_delay,
            } => {
                let (anchor, gap) = record
                    .last_completion
                    .map_or((now, *initial_delay), |done| (done, *delay));
                shift(anchor, gap).map(Some)
            }
            Self::FixedRate {
                period,
                initial_delay,
            } => {
                let (anchor, gap) = record
                    .last_start
                    .map_or((now, *initial_delay), |started| (started, *period));
                shift(anchor, gap).map(Some)
            }
            Self::Cron(cron) => Ok(cron.next_after(now)),
            Self::Custom(custom) => Ok((custom.policy)(record, now)),
        }
    }

    /// Short policy name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::FixedDelay { .. } => "fixed_delay",
            Self::FixedRate { .. } => "fixed_rate",
            Self::Cron(_) => "cron",
            Self::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedDelay {
                delay,
                initial_delay,
            } => f
                .debug_struct("FixedDelay")
                .field("delay", delay)
                .field("initial_delay", initial_delay)
                .finish(),
            Self::FixedRate {
                period,
                initial_delay,
            } => f
                .debug_struct("FixedRate")
                .field("period", period)
                .field("initial_delay", initial_delay)
                .finish(),
            Self::Cron(cron) => f.debug_tuple("Cron").field(&cron.expression()).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

fn shift(anchor: DateTime<Utc>, by: Duration) -> Result<DateTime<Utc>, SchedulerError> {
    offset(anchor, by)
        .ok_or_else(|| SchedulerError::trigger(format!("{anchor} + {by:?} overflows")))
}

/// Time zone a cron expression is matched in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CronZone {
    /// The host's local zone.
    #[default]
    Local,
    /// Coordinated universal time.
    Utc,
    /// Fixed offset, in seconds east of UTC.
    Offset(i32),
}

/// Cron schedule wrapper using the `cron` crate.
///
/// Expressions use standard cron numbering: day-of-week `0` and `7` are
/// Sunday, `1` is Monday. Names (`MON`, `Sun`) and the `@hourly`, `@daily`,
/// `@midnight`, `@weekly`, `@monthly`, `@yearly` and `@annually` macros are
/// accepted too.
#[derive(Clone)]
pub struct CronTrigger {
    expression: String,
    schedule: Schedule,
    zone: CronZone,
}

impl CronTrigger {
    /// Parse a 6-field (`sec min hour dom month dow`) or 5-field
    /// (`min hour dom month dow`) expression, matched in local time. Five
    /// fields fire at second 0.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::TriggerComputation` when parsing fails.
    pub fn parse(expression: impl Into<String>) -> Result<Self, SchedulerError> {
        Self::parse_in(expression, CronZone::Local)
    }

    /// Like [`parse`](Self::parse), matched in `zone`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::TriggerComputation` when parsing fails or the
    /// offset is not a valid UTC offset.
    pub fn parse_in(expression: impl Into<String>, zone: CronZone) -> Result<Self, SchedulerError> {
        let expression = expression.into();
        if let CronZone::Offset(secs) = zone {
            if FixedOffset::east_opt(secs).is_none() {
                return Err(SchedulerError::trigger(format!(
                    "utc offset {secs}s is out of range"
                )));
            }
        }
        let normalized = normalize(&expression)?;
        let schedule = Schedule::from_str(&normalized).map_err(|e| {
            SchedulerError::trigger(format!("invalid cron expression `{expression}`: {e}"))
        })?;
        Ok(Self {
            expression,
            schedule,
            zone,
        })
    }

    /// The expression as written by the caller.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Zone the expression is matched in.
    #[must_use]
    pub const fn zone(&self) -> CronZone {
        self.zone
    }

    /// Earliest matching instant strictly after `now`.
    #[must_use]
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.zone {
            CronZone::Local => self.next_in(&Local, now),
            CronZone::Utc => self.next_in(&Utc, now),
            CronZone::Offset(secs) => self.next_in(&FixedOffset::east_opt(secs)?, now),
        }
    }

    fn next_in<Z: TimeZone>(&self, zone: &Z, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&now.with_timezone(zone))
            .next()
            .map(|at| at.with_timezone(&Utc))
    }
}

impl fmt::Debug for CronTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronTrigger")
            .field("expression", &self.expression())
            .field("zone", &self.zone)
            .finish()
    }
}

/// Rewrite a user expression into the 6-field form the `cron` crate parses.
fn normalize(expression: &str) -> Result<String, SchedulerError> {
    let trimmed = expression.trim();
    if trimmed.starts_with('@') {
        return expand_macro(trimmed).map_or_else(
            || Err(SchedulerError::trigger(format!("unknown cron macro `{trimmed}`"))),
            normalize,
        );
    }
    let mut fields: Vec<&str> = trimmed.split_whitespace().collect();
    match fields.len() {
        5 => fields.insert(0, "0"),
        6 => {}
        n => {
            return Err(SchedulerError::trigger(format!(
                "cron expression `{expression}` has {n} fields, expected 5 or 6"
            )))
        }
    }
    let day_of_week = day_of_week_field(fields[5]).map_err(|reason| {
        SchedulerError::trigger(format!("cron expression `{expression}`: {reason}"))
    })?;
    Ok(format!("{} {day_of_week}", fields[..5].join(" ")))
}

fn expand_macro(name: &str) -> Option<&'static str> {
    Some(match name.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => "0 0 0 1 1 *",
        "@monthly" => "0 0 0 1 * *",
        "@weekly" => "0 0 0 * * 0",
        "@daily" | "@midnight" => "0 0 0 * * *",
        "@hourly" => "0 0 * * * *",
        _ => return None,
    })
}

/// Translate numeric day-of-week items from standard numbering (`0`/`7` =
/// Sunday) to the `cron` crate's (`1` = Sunday). Wildcards and names pass
/// through unchanged.
fn day_of_week_field(field: &str) -> Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }
    let mut items = Vec::new();
    let mut days = [false; 7];
    for item in field.split(',') {
        if item.chars().any(|c| c.is_ascii_alphabetic()) {
            items.push(item.to_string());
            continue;
        }
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, parse_step(step)?),
            None => (item, 1),
        };
        let (first, last) = match range.split_once('-') {
            _ if range == "*" => (0, 6),
            Some((a, b)) => (parse_day(a)?, parse_day(b)?),
            None if step > 1 => (parse_day(range)?, 6),
            None => {
                let day = parse_day(range)?;
                (day, day)
            }
        };
        if first > last {
            return Err(format!("day-of-week range `{range}` runs backwards"));
        }
        for day in (first..=last).step_by(step) {
            days[day % 7] = true;
        }
    }
    items.extend(
        days.iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(day, _)| (day + 1).to_string()),
    );
    Ok(items.join(","))
}

fn parse_day(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(day) if day <= 7 => Ok(day),
        _ => Err(format!("invalid day-of-week `{raw}`")),
    }
}

fn parse_step(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(step) if step > 0 => Ok(step),
        _ => Err(format!("invalid day-of-week step `{raw}`")),
    }
}

/// User-supplied trigger policy.
#[derive(Clone)]
pub struct CustomTrigger {
    policy: Arc<TriggerPolicy>,
}

impl CustomTrigger {
    /// Wrap a policy function.
    pub fn new<F>(policy: F) -> Self
    where
        F: Fn(&ExecutionRecord, DateTime<Utc>) -> Option<DateTime<Utc>> + Send + Sync + 'static,
    {
        Self {
            policy: Arc::new(policy),
        }
    }
}
