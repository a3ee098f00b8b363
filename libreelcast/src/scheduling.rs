//! Schedule parsing utilities
//!
//! Job times are local wall-clock times. New jobs are written as
//! `YYYY-MM-DD HH:MM`; older job files may carry ISO-8601 or RFC 3339 values,
//! which are still accepted when reading.

use chrono::{DateTime, Duration, Local, NaiveDateTime, Timelike};

use crate::{ReelcastError, Result};

/// Format used for `scheduled_time` and for batch start times
pub const SLOT_FORMAT: &str = "%Y-%m-%d %H:%M";

const LENIENT_FORMATS: &[&str] = &[
    SLOT_FORMAT,
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse a batch start time in the strict `YYYY-MM-DD HH:MM` form
pub fn parse_start_time(input: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(input.trim(), SLOT_FORMAT).map_err(|_| {
        ReelcastError::ScheduleFormat(format!(
            "Wrong start time '{}'. Use YYYY-MM-DD HH:MM",
            input
        ))
    })
}

/// Parse any timestamp format a job file may contain
pub fn parse_timestamp(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Local).naive_local());
    }

    LENIENT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
}

/// Resolve a job's run time from `scheduled_time`, falling back to `run_at`
///
/// The first non-empty field wins; it must parse.
pub fn resolve_run_time(scheduled_time: Option<&str>, run_at: Option<&str>) -> Result<NaiveDateTime> {
    let raw = [scheduled_time, run_at]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            ReelcastError::ScheduleFormat("Missing scheduled_time / run_at".to_string())
        })?;

    parse_timestamp(raw).ok_or_else(|| {
        ReelcastError::ScheduleFormat(format!("Unparsable scheduled time '{}'", raw))
    })
}

/// Render a slot the way it is stored in the job file
pub fn format_slot(slot: NaiveDateTime) -> String {
    slot.format(SLOT_FORMAT).to_string()
}

/// Pick the first slot of a batch
///
/// A start at or before `now` moves to one minute from now, truncated to the
/// minute. The truncated value is still strictly after `now`.
pub fn first_slot(start: NaiveDateTime, now: NaiveDateTime) -> NaiveDateTime {
    if start > now {
        return start;
    }
    truncate_to_minute(now + Duration::minutes(1))
}

fn truncate_to_minute(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

/// Parse the spacing between batch slots
///
/// Accepts humantime strings ("30m", "1h 30m") or a bare number of minutes.
pub fn parse_gap(input: &str) -> Result<std::time::Duration> {
    let input = input.trim();

    let gap = match input.parse::<u64>() {
        Ok(minutes) => minutes
            .checked_mul(60)
            .map(std::time::Duration::from_secs)
            .ok_or_else(|| ReelcastError::InvalidInput(format!("Gap too large: {} minutes", minutes)))?,
        Err(_) => humantime::parse_duration(input).map_err(|e| {
            ReelcastError::InvalidInput(format!("Could not parse gap '{}': {}", input, e))
        })?,
    };

    if gap.is_zero() {
        return Err(ReelcastError::InvalidInput(
            "Gap between posts must be greater than zero".to_string(),
        ));
    }

    Ok(gap)
}
