// # Ledger Store Implementations
//
// This module provides implementations of the LedgerStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileLedgerStore;
pub use memory::MemoryLedgerStore;

use crate::config::LedgerStoreConfig;
use crate::traits::LedgerStore;

/// Build the ledger store selected by configuration
pub async fn from_config(config: &LedgerStoreConfig) -> Result<Box<dyn LedgerStore>, crate::Error> {
    match config {
        LedgerStoreConfig::File { path } => Ok(Box::new(FileLedgerStore::new(path).await?)),
        LedgerStoreConfig::Memory => Ok(Box::new(MemoryLedgerStore::new())),
    }
}
