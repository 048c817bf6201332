// # Ledger Store Trait
//
// Defines the interface for durable persistence of the throttle-history
// ledger.
//
// ## Purpose
//
// The ledger is the memory of the monitor. It records, per resource:
// - The throttle flag of the most recent processed observation
// - When the resource was last throttled / released
// - How often it was throttled and for how long in total
// - A bounded event log of transitions
//
// Transitions are detected against this ledger, so it also guarantees that
// each transition triggers its side effects exactly once, across restarts.
//
// ## Implementations
//
// - File-based: JSON document, write-then-rename
// - Memory: tests and throwaway deployments

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Maximum number of events retained per resource
pub const MAX_EVENTS: usize = 100;

/// The full ledger, keyed by resource id
pub type Ledger = BTreeMap<String, LedgerEntry>;

/// Kind of a recorded transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Resource went from normal to throttled
    Throttled,
    /// Resource went from throttled to normal
    Unthrottled,
}

/// One recorded transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleEvent {
    /// Direction of the transition
    pub kind: EventKind,
    /// When the transition was observed
    pub timestamp: DateTime<Utc>,
    /// Length of the closed throttle period (unthrottle events only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
}

/// Durable per-resource throttle history
///
/// `current_throttled` always equals the throttle flag of the most recently
/// processed observation for the resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Last known display name (refreshing it never touches history)
    pub display_name: String,
    /// Throttle flag of the latest processed observation
    pub current_throttled: bool,
    /// Start of the latest throttle period
    #[serde(default)]
    pub last_throttle_time: Option<DateTime<Utc>>,
    /// End of the latest throttle period
    #[serde(default)]
    pub last_unthrottle_time: Option<DateTime<Utc>>,
    /// Number of normal -> throttled transitions
    #[serde(default)]
    pub throttle_count: u64,
    /// Sum of all closed throttle periods
    #[serde(default)]
    pub total_throttled_seconds: u64,
    /// Most recent transitions, oldest first
    #[serde(default)]
    pub events: VecDeque<ThrottleEvent>,
}

impl LedgerEntry {
    /// Create the baseline entry for a resource seen for the first time
    ///
    /// No event is recorded. A resource that is already throttled when first
    /// seen gets `last_throttle_time = at`, so its open period has a (lower
    /// bound) start.
    pub(crate) fn baseline(
        display_name: impl Into<String>,
        throttled: bool,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            current_throttled: throttled,
            last_throttle_time: throttled.then_some(at),
            last_unthrottle_time: None,
            throttle_count: 0,
            total_throttled_seconds: 0,
            events: VecDeque::new(),
        }
    }

    /// Apply a normal -> throttled transition
    pub(crate) fn record_throttled(&mut self, at: DateTime<Utc>) {
        self.current_throttled = true;
        self.throttle_count += 1;
        self.last_throttle_time = Some(at);
        self.push_event(ThrottleEvent {
            kind: EventKind::Throttled,
            timestamp: at,
            duration_seconds: None,
        });
    }

    /// Apply a throttled -> normal transition
    ///
    /// Closes the open period and returns its length in seconds. Clock skew
    /// (release before start) counts as zero.
    pub(crate) fn record_unthrottled(&mut self, at: DateTime<Utc>) -> u64 {
        let duration = self
            .last_throttle_time
            .map(|start| at.signed_duration_since(start).num_seconds().max(0) as u64)
            .unwrap_or(0);

        self.current_throttled = false;
        self.total_throttled_seconds += duration;
        self.last_unthrottle_time = Some(at);
        self.push_event(ThrottleEvent {
            kind: EventKind::Unthrottled,
            timestamp: at,
            duration_seconds: Some(duration),
        });
        duration
    }

    fn push_event(&mut self, event: ThrottleEvent) {
        while self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Trait for ledger store implementations
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Recover from corrupt documents
///
/// ## Forbidden Capabilities
/// - ❌ Mutate ledger entries (owned by `Reconciler`)
/// - ❌ Retry failed saves on their own (the next cycle saves again)
/// - ❌ Spawn background tasks
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the full ledger
    ///
    /// # Returns
    ///
    /// - `Ok(Ledger)`: The stored ledger; empty if nothing is stored or the
    ///   stored document is corrupt (corruption is logged)
    /// - `Err(Error)`: Storage could not be read at all
    async fn load(&self) -> Result<Ledger, crate::Error>;

    /// Persist the full ledger as one atomic unit
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The ledger is durable
    /// - `Err(Error)`: Nothing was replaced; the previous document is intact
    async fn save(&self, ledger: &Ledger) -> Result<(), crate::Error>;
}
