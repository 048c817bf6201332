// # Status Source Trait
//
// Defines the interface for reading throttle status from a hosting provider.
//
// ## Implementations
//
// - Netcup SCP REST API: `throttlewatch-netcup` crate
//
// ## Usage
//
// ```rust,ignore
// use throttlewatch_core::StatusSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* StatusSource implementation */;
//
//     for server in source.list_servers().await? {
//         let status = source.fetch_status(&server).await?;
//         println!("{} throttled={:?}", server.display_name, status.throttled);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::TrafficCounters;

/// A server as listed by a hosting account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRef {
    /// Provider-side server identifier
    pub server_id: String,
    /// Human-facing name (hostname, nickname, or the id itself)
    pub display_name: String,
}

impl ServerRef {
    /// Create a new server reference
    pub fn new(server_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Raw status fields returned for one server
///
/// Every field is optional: a provider reports what it could read and the
/// engine decides whether the observation is usable. A missing `ipv4` or
/// `throttled` makes the server unavailable for this cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Primary public IPv4 address (the resource identity)
    pub ipv4: Option<String>,
    /// Whether any interface is currently bandwidth throttled
    pub throttled: Option<bool>,
    /// Monthly traffic counters summed over all interfaces
    pub traffic: TrafficCounters,
    /// Provider-reported run state (e.g. "RUNNING")
    pub operational_status: Option<String>,
}

/// Trait for status source implementations
///
/// One instance serves exactly one hosting account.
///
/// # Trust Level: Untrusted
///
/// Status sources are external integrations:
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their provider only
/// - ✅ Refresh their own credentials
/// - ✅ Parse provider-specific responses
///
/// ## Forbidden Capabilities
/// - ❌ Retry with backoff (the next poll cycle is the retry)
/// - ❌ Access the ledger (owned by `Reconciler`)
/// - ❌ Decide whether a throttle state changed (owned by the detector)
/// - ❌ Spawn tasks or threads
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Account this source reads from (used for logging and views)
    fn account_id(&self) -> &str;

    /// List all servers of the account
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<ServerRef>)`: Servers of the account (may be empty)
    /// - `Err(Error)`: The listing could not be obtained
    async fn list_servers(&self) -> Result<Vec<ServerRef>, crate::Error>;

    /// Fetch the current status of one server
    ///
    /// Implementations should issue a single detail request.
    ///
    /// # Returns
    ///
    /// - `Ok(ServerStatus)`: Whatever fields could be read
    /// - `Err(Error)`: The server could not be queried
    async fn fetch_status(&self, server: &ServerRef) -> Result<ServerStatus, crate::Error>;
}

/// Helper trait for constructing status sources from account configuration
pub trait StatusSourceFactory: Send + Sync {
    /// Create a StatusSource for one account
    ///
    /// # Parameters
    ///
    /// - `account`: Complete account credentials
    ///
    /// # Returns
    ///
    /// A boxed StatusSource trait object
    fn create(
        &self,
        account: &crate::config::AccountConfig,
    ) -> Result<Box<dyn StatusSource>, crate::Error>;
}
