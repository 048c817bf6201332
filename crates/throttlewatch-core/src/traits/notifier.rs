// # Notifier Trait
//
// Best-effort message delivery. A notifier failure never affects ledger or
// automation state.

use async_trait::async_trait;

/// Trait for notification channels
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message
    ///
    /// The text may contain the HTML subset understood by chat bots
    /// (`<b>`, `<i>`, `<code>`).
    async fn deliver(&self, text: &str) -> Result<(), crate::Error>;

    /// Name of the channel (for logging)
    fn name(&self) -> &'static str;
}
