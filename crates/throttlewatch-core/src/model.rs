//! Domain values produced by a poll cycle
//!
//! An [`Observation`] is the typed snapshot of one server at one poll. It is
//! built by explicit field extraction from a [`ServerStatus`]; anything the
//! engine needs but the provider did not report makes the server
//! unavailable for this cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::traits::{ServerRef, ServerStatus};

/// Monthly traffic counters in MiB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficCounters {
    /// Received MiB
    pub rx_mib: u64,
    /// Transmitted MiB
    pub tx_mib: u64,
}

impl TrafficCounters {
    /// Create counters from raw MiB values
    pub fn new(rx_mib: u64, tx_mib: u64) -> Self {
        Self { rx_mib, tx_mib }
    }

    /// Received traffic in GiB, two decimals
    pub fn rx_gb(&self) -> f64 {
        mib_to_gb(self.rx_mib)
    }

    /// Transmitted traffic in GiB, two decimals
    pub fn tx_gb(&self) -> f64 {
        mib_to_gb(self.tx_mib)
    }

    /// Combined traffic in GiB, two decimals
    pub fn total_gb(&self) -> f64 {
        mib_to_gb(self.rx_mib.saturating_add(self.tx_mib))
    }
}

fn mib_to_gb(mib: u64) -> f64 {
    (mib as f64 / 1024.0 * 100.0).round() / 100.0
}

/// Snapshot of one resource at one poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Stable resource key (primary IPv4 address)
    pub resource_id: String,
    /// Human-facing server name
    pub display_name: String,
    /// Account the server was listed under
    pub account_id: String,
    /// Provider-side server id
    pub server_id: String,
    /// Throttle flag
    pub throttled: bool,
    /// Monthly traffic
    pub traffic: TrafficCounters,
    /// Provider-reported run state
    pub operational_status: String,
    /// When the status was read
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    /// Build an observation from a provider status
    ///
    /// # Errors
    ///
    /// Returns a status source error if the status lacks the address or the
    /// throttle flag.
    pub fn from_status(
        account_id: &str,
        server: &ServerRef,
        status: ServerStatus,
        observed_at: DateTime<Utc>,
    ) -> Result<Self> {
        let resource_id = status
            .ipv4
            .filter(|ip| !ip.trim().is_empty())
            .ok_or_else(|| {
                Error::status_source(format!(
                    "no IPv4 address reported for server {}",
                    server.display_name
                ))
            })?;

        let throttled = status.throttled.ok_or_else(|| {
            Error::status_source(format!(
                "no throttle flag reported for server {}",
                server.display_name
            ))
        })?;

        Ok(Self {
            resource_id,
            display_name: server.display_name.clone(),
            account_id: account_id.to_string(),
            server_id: server.server_id.clone(),
            throttled,
            traffic: status.traffic,
            operational_status: status
                .operational_status
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            observed_at,
        })
    }
}

/// Source of the current time
///
/// Injected into the engine so scenarios with fixed durations are
/// deterministic under test.
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
