// # File Ledger Store
//
// File-based implementation of LedgerStore with crash recovery.
//
// ## Purpose
//
// Keeps the throttle history across daemon restarts, so a transition that
// was already acted upon is never acted upon again after a restart.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename, a concurrent `load` never sees a
//   partial document
// - Automatic backup: the previous document is kept as `.backup`
// - Corruption detection: JSON validation on load
// - Recovery: falls back to the backup, then to an empty ledger
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "entries": {
//     "203.0.113.7": {
//       "display_name": "v2202401234567",
//       "current_throttled": false,
//       "last_throttle_time": "2025-01-09T12:00:00Z",
//       "last_unthrottle_time": "2025-01-09T12:10:00Z",
//       "throttle_count": 1,
//       "total_throttled_seconds": 600,
//       "events": [ ... ]
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::traits::ledger_store::{Ledger, LedgerStore};

/// Ledger file format version
/// Used for future migration if format changes
const LEDGER_FILE_VERSION: &str = "1.0";

/// Serializable ledger file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct LedgerFileFormat {
    version: String,
    entries: Ledger,
}

/// File-based ledger store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use throttlewatch_core::ledger::FileLedgerStore;
/// use throttlewatch_core::traits::LedgerStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileLedgerStore::new("/var/lib/throttlewatch/history.json").await?;
///
///     let ledger = store.load().await?;
///     store.save(&ledger).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileLedgerStore {
    path: PathBuf,
    /// Serializes writers so temp files never interleave
    write_lock: Mutex<()>,
}

impl FileLedgerStore {
    /// Create a file ledger store
    ///
    /// Creates the parent directory if needed. Nothing is read until
    /// [`LedgerStore::load`] is called.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create ledger directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the ledger document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse one ledger document
    ///
    /// Returns `Ok(None)` if the file does not exist.
    async fn read_document(path: &Path) -> Result<Option<Ledger>, Error> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read(path).await.map_err(|e| {
            Error::ledger_store(format!(
                "Failed to read ledger file {}: {}",
                path.display(),
                e
            ))
        })?;

        // Invalid UTF-8 surfaces as a JSON error and takes the recovery path
        let document: LedgerFileFormat = serde_json::from_slice(&content)?;

        if document.version != LEDGER_FILE_VERSION {
            tracing::warn!(
                "Ledger file version mismatch: expected {}, got {}. Attempting to load anyway.",
                LEDGER_FILE_VERSION,
                document.version
            );
        }

        Ok(Some(document.entries))
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        Self::with_suffix(&self.path, ".tmp")
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        Self::with_suffix(path, ".backup")
    }

    /// `<path><suffix>`, keeping any existing extension
    fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }
}

#[async_trait]
impl LedgerStore for FileLedgerStore {
    async fn load(&self) -> Result<Ledger, Error> {
        match Self::read_document(&self.path).await {
            Ok(Some(ledger)) => {
                tracing::debug!("Loaded ledger from file: {} entries", ledger.len());
                Ok(ledger)
            }
            Ok(None) => {
                tracing::debug!("Ledger file does not exist: {}", self.path.display());
                Ok(Ledger::new())
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Ledger file {} appears corrupted: {}. Attempting recovery from backup.",
                    self.path.display(),
                    e
                );

                let backup_path = Self::backup_path(&self.path);
                match Self::read_document(&backup_path).await {
                    Ok(Some(ledger)) => {
                        tracing::info!("Recovered ledger from backup: {} entries", ledger.len());
                        Ok(ledger)
                    }
                    Ok(None) => {
                        tracing::warn!("No ledger backup found. Starting with empty ledger.");
                        Ok(Ledger::new())
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Ledger backup also unreadable: {}. Starting with empty ledger.",
                            backup_err
                        );
                        Ok(Ledger::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn save(&self, ledger: &Ledger) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;

        let document = LedgerFileFormat {
            version: LEDGER_FILE_VERSION.to_string(),
            entries: ledger.clone(),
        };

        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| Error::ledger_store(format!("Failed to serialize ledger: {}", e)))?;

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::ledger_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::ledger_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::ledger_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Keep the previous document as backup
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create ledger backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::ledger_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Ledger written to file: {}", self.path.display());
        Ok(())
    }
}
