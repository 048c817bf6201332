// # Automation Trait
//
// Defines the interface for the downstream download automation that is
// switched off while a resource is throttled and back on afterwards.
//
// ## Implementations
//
// - Vertex downloader toggle (+ optional qBittorrent purge): `throttlewatch-vertex`

use async_trait::async_trait;

/// Trait for downstream automation implementations
///
/// Calls are issued at most once per genuine transition. A failure is
/// logged by the engine and never retried within the same cycle.
///
/// # Trust Level: Untrusted
///
/// ## Forbidden Capabilities
/// - ❌ Retry on failure (the engine decides, and it does not retry)
/// - ❌ Access the ledger
/// - ❌ Spawn tasks or threads
#[async_trait]
pub trait Automation: Send + Sync {
    /// Re-enable automation for a resource that is no longer throttled
    async fn enable(&self, resource_id: &str) -> Result<(), crate::Error>;

    /// Disable automation for a throttled resource
    async fn disable(&self, resource_id: &str) -> Result<(), crate::Error>;

    /// Name of the automation backend (for logging)
    fn name(&self) -> &'static str;
}
