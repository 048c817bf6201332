//! Read-side cache
//!
//! The reconciliation loop builds a complete [`CacheSnapshot`] per cycle and
//! swaps it in with one pointer replacement. Readers clone the `Arc` and
//! drop the lock immediately, so they never wait on a cycle and never see a
//! half-updated cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::availability::{self, AvailabilityView};
use crate::model::Observation;
use crate::traits::LedgerEntry;

/// Immutable state published at the end of a cycle
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    /// When the snapshot was published (`None` before the first cycle)
    pub updated_at: Option<DateTime<Utc>>,
    /// Number of completed cycles
    pub cycles_completed: u64,
    /// Latest observation per resource
    pub servers: BTreeMap<String, Observation>,
    /// Ledger entries of the cached resources, as of the publish
    pub ledger: BTreeMap<String, LedgerEntry>,
}

impl CacheSnapshot {
    /// Number of cached resources
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Whether no resource is cached
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Enriched view of one resource
    pub fn view(&self, resource_id: &str, now: DateTime<Utc>) -> Option<ServerView> {
        self.servers
            .get(resource_id)
            .map(|obs| ServerView::build(obs, self.ledger.get(resource_id), now))
    }

    /// Enriched views of all resources, ordered by resource id
    pub fn views(&self, now: DateTime<Utc>) -> Vec<ServerView> {
        self.servers
            .values()
            .map(|obs| ServerView::build(obs, self.ledger.get(&obs.resource_id), now))
            .collect()
    }

    /// Aggregate report for the status API
    pub fn report(&self, now: DateTime<Utc>) -> StatusReport {
        let servers = self.views(now);
        let throttled_count = servers.iter().filter(|s| s.throttled).count();

        StatusReport {
            last_update: availability::format_timestamp(self.updated_at.unwrap_or(now)),
            total_servers: servers.len(),
            throttled_count,
            normal_count: servers.len() - throttled_count,
            servers,
        }
    }
}

/// Observation fields merged with availability statistics
///
/// Field names follow the legacy webhook payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerView {
    /// Resource id (primary IPv4)
    #[serde(rename = "ipv4IP")]
    pub resource_id: String,
    /// Throttle flag
    #[serde(rename = "trafficThrottled")]
    pub throttled: bool,
    /// Provider-reported run state
    pub status: String,
    /// rx + tx in GiB
    pub traffic_gb: f64,
    /// Received GiB
    pub rx_gb: f64,
    /// Transmitted GiB
    pub tx_gb: f64,
    /// Account the server belongs to
    pub account_id: String,
    /// Provider-side server id
    pub server_id: String,
    /// Human-facing name
    pub server_name: String,
    /// When the observation was taken
    pub last_check_time: String,
    /// Derived statistics
    #[serde(flatten)]
    pub availability: AvailabilityView,
}

impl ServerView {
    fn build(obs: &Observation, entry: Option<&LedgerEntry>, now: DateTime<Utc>) -> Self {
        let availability = entry
            .map(|entry| availability::compute(entry, now))
            .unwrap_or_else(availability::empty_view);

        Self {
            resource_id: obs.resource_id.clone(),
            throttled: obs.throttled,
            status: obs.operational_status.clone(),
            traffic_gb: obs.traffic.total_gb(),
            rx_gb: obs.traffic.rx_gb(),
            tx_gb: obs.traffic.tx_gb(),
            account_id: obs.account_id.clone(),
            server_id: obs.server_id.clone(),
            server_name: obs.display_name.clone(),
            last_check_time: availability::format_timestamp(obs.observed_at),
            availability,
        }
    }
}

/// Payload of the status API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Publish time of the snapshot
    pub last_update: String,
    /// Number of cached resources
    pub total_servers: usize,
    /// Resources currently throttled
    pub throttled_count: usize,
    /// Resources currently not throttled
    pub normal_count: usize,
    /// Enriched views
    pub servers: Vec<ServerView>,
}

/// Shared handle to the published snapshot
///
/// Cloning the handle is cheap; all clones see the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct StatusCache {
    inner: Arc<RwLock<Arc<CacheSnapshot>>>,
}

impl StatusCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot
    pub async fn snapshot(&self) -> Arc<CacheSnapshot> {
        Arc::clone(&*self.inner.read().await)
    }

    /// Replace the snapshot
    pub(crate) async fn publish(&self, snapshot: CacheSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self.inner.write().await = snapshot;
    }

    /// Whether at least one cycle has been published
    pub async fn is_warm(&self) -> bool {
        self.snapshot().await.cycles_completed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrafficCounters;

    fn observation(id: &str, throttled: bool) -> Observation {
        Observation {
            resource_id: id.to_string(),
            display_name: format!("srv-{}", id),
            account_id: "acct".to_string(),
            server_id: "1".to_string(),
            throttled,
            traffic: TrafficCounters::new(1024, 2048),
            operational_status: "RUNNING".to_string(),
            observed_at: Utc::now(),
        }
    }

    fn snapshot(observations: Vec<Observation>) -> CacheSnapshot {
        let now = Utc::now();
        let mut snapshot = CacheSnapshot {
            updated_at: Some(now),
            cycles_completed: 1,
            ..Default::default()
        };
        for obs in observations {
            snapshot.ledger.insert(
                obs.resource_id.clone(),
                LedgerEntry::baseline(&obs.display_name, obs.throttled, now),
            );
            snapshot.servers.insert(obs.resource_id.clone(), obs);
        }
        snapshot
    }

    #[tokio::test]
    async fn cache_starts_cold_and_empty() {
        let cache = StatusCache::new();
        assert!(!cache.is_warm().await);
        assert!(cache.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn publish_replaces_whole_snapshot() {
        let cache = StatusCache::new();
        cache
            .publish(snapshot(vec![observation("10.0.0.1", false)]))
            .await;
        let held = cache.snapshot().await;

        cache
            .publish(snapshot(vec![
                observation("10.0.0.2", true),
                observation("10.0.0.3", false),
            ]))
            .await;

        // A reader holding the old snapshot keeps a consistent view
        assert_eq!(held.len(), 1);
        assert_eq!(cache.snapshot().await.len(), 2);
        assert!(cache.is_warm().await);
    }

    #[test]
    fn report_counts_throttled_and_normal() {
        let snap = snapshot(vec![
            observation("10.0.0.1", true),
            observation("10.0.0.2", false),
            observation("10.0.0.3", false),
        ]);

        let report = snap.report(Utc::now());
        assert_eq!(report.total_servers, 3);
        assert_eq!(report.throttled_count, 1);
        assert_eq!(report.normal_count, 2);
    }

    #[test]
    fn view_uses_legacy_field_names() {
        let snap = snapshot(vec![observation("10.0.0.1", true)]);
        let view = snap.view("10.0.0.1", Utc::now()).unwrap();
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["ipv4IP"], "10.0.0.1");
        assert_eq!(json["trafficThrottled"], true);
        assert_eq!(json["traffic_gb"], 3.0);
        assert_eq!(json["server_name"], "srv-10.0.0.1");
        assert_eq!(json["throttle_count"], 0);
        assert!(json.get("total_throttled_time").is_some());
        assert!(snap.view("10.9.9.9", Utc::now()).is_none());
    }
}
