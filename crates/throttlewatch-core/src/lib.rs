// # throttlewatch-core
//
// Core library for the bandwidth-throttle monitor.
//
// ## Architecture Overview
//
// This library provides the state-change detection and reconciliation
// engine:
// - **StatusSource**: Trait for reading per-server throttle status from a
//   hosting account
// - **Automation**: Trait for toggling the downstream download automation
// - **Notifier**: Trait for best-effort chat notifications
// - **LedgerStore**: Trait for durable throttle-history persistence
// - **Reconciler**: Runs one poll cycle (detect, mutate ledger, act, publish)
// - **PollScheduler**: Drives the Reconciler on a fixed interval
// - **StatusCache**: Atomically swapped read-side snapshot
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from the HTTP clients
// 2. **Single Writer**: Only the Reconciler mutates the ledger
// 3. **At-Most-Once Events**: The ledger is updated before side effects run
// 4. **Failure Containment**: One bad account or server never aborts a cycle
// 5. **Library-First**: The daemon is a thin wiring layer over this crate

pub mod availability;
pub mod cache;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod model;
pub mod traits;

// Re-export core types for convenience
pub use cache::{CacheSnapshot, ServerView, StatusCache, StatusReport};
pub use config::{AccountConfig, LedgerStoreConfig, MonitorConfig};
pub use detector::{Detection, detect};
pub use engine::{AccountSource, CycleReport, EngineEvent, PollScheduler, Reconciler};
pub use error::{Error, ErrorClass, Result};
pub use ledger::{FileLedgerStore, MemoryLedgerStore};
pub use model::{Clock, Observation, SystemClock, TrafficCounters};
pub use traits::{Automation, LedgerStore, Notifier, StatusSource, StatusSourceFactory};
