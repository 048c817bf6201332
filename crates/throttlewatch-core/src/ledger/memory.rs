// # Memory Ledger Store
//
// In-memory implementation of LedgerStore.
//
// ## Crash Behavior
//
// - All history is lost on restart
// - Every resource is a first observation again after a restart, so the
//   automation is re-synchronized but no transition is reported
//
// ## When to Use
//
// - Testing environments
// - Deployments where history is not needed

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::ledger_store::{Ledger, LedgerStore};

/// In-memory ledger store
///
/// Clones share the same underlying ledger.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    inner: Arc<RwLock<Ledger>>,
}

impl MemoryLedgerStore {
    /// Create a new empty memory ledger store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with a ledger
    pub fn with_ledger(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ledger)),
        }
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self) -> Result<Ledger, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, ledger: &Ledger) -> Result<(), Error> {
        *self.inner.write().await = ledger.clone();
        Ok(())
    }
}
