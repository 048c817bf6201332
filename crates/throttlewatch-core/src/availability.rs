//! Availability statistics derived from a ledger entry
//!
//! [`compute`] is a pure function of `(entry, now)`. It is called by readers
//! on the snapshot they are serving, so it never races the reconciliation
//! loop.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::traits::{EventKind, LedgerEntry, MAX_EVENTS};

/// Display format for timestamps in views and notifications
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Human-facing statistics for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityView {
    /// Number of normal -> throttled transitions
    pub throttle_count: u64,
    /// Length of the open throttle period (0 when not throttled)
    pub current_throttle_duration_seconds: u64,
    /// Formatted `current_throttle_duration_seconds`
    pub current_throttle_duration: String,
    /// Sum of all closed throttle periods (excludes the open one)
    pub total_throttled_seconds: u64,
    /// Formatted `total_throttled_seconds`
    pub total_throttled_time: String,
    /// Formatted start of the latest throttle period
    pub last_throttle_time: Option<String>,
    /// Formatted end of the latest throttle period
    pub last_unthrottle_time: Option<String>,
    /// Most recent transitions, oldest first
    pub events: Vec<EventView>,
}

/// Display form of a ledger event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventView {
    /// Direction of the transition
    pub kind: EventKind,
    /// Formatted timestamp
    pub timestamp: String,
    /// Length of the closed period (unthrottle events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    /// Formatted `duration_seconds`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

/// Derive the availability view of a ledger entry at `now`
pub fn compute(entry: &LedgerEntry, now: DateTime<Utc>) -> AvailabilityView {
    let current = if entry.current_throttled {
        entry
            .last_throttle_time
            .map(|start| now.signed_duration_since(start).num_seconds().max(0) as u64)
            .unwrap_or(0)
    } else {
        0
    };

    let skip = entry.events.len().saturating_sub(MAX_EVENTS);
    let events = entry
        .events
        .iter()
        .skip(skip)
        .map(|event| EventView {
            kind: event.kind,
            timestamp: format_timestamp(event.timestamp),
            duration_seconds: event.duration_seconds,
            duration: event.duration_seconds.map(format_duration),
        })
        .collect();

    AvailabilityView {
        throttle_count: entry.throttle_count,
        current_throttle_duration_seconds: current,
        current_throttle_duration: format_duration(current),
        total_throttled_seconds: entry.total_throttled_seconds,
        total_throttled_time: format_duration(entry.total_throttled_seconds),
        last_throttle_time: entry.last_throttle_time.map(format_timestamp),
        last_unthrottle_time: entry.last_unthrottle_time.map(format_timestamp),
        events,
    }
}

/// View of a resource that has no ledger entry yet
pub fn empty_view() -> AvailabilityView {
    AvailabilityView {
        throttle_count: 0,
        current_throttle_duration_seconds: 0,
        current_throttle_duration: format_duration(0),
        total_throttled_seconds: 0,
        total_throttled_time: format_duration(0),
        last_throttle_time: None,
        last_unthrottle_time: None,
        events: Vec::new(),
    }
}

/// Format seconds as `"1d 2h 3m 4s"`, dropping leading zero units
pub fn format_duration(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;

    let parts = [(days, "d"), (hours, "h"), (minutes, "m"), (seconds, "s")];
    let first = parts.iter().position(|(value, _)| *value > 0).unwrap_or(3);

    parts[first..]
        .iter()
        .map(|(value, unit)| format!("{}{}", value, unit))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format a timestamp in local time
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}
