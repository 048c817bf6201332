//! Core traits for the throttle monitor
//!
//! This module defines the abstract interfaces the reconciliation engine
//! consumes. Every external system sits behind one of these seams.
//!
//! - [`StatusSource`]: Fetch per-server throttle status from a hosting account
//! - [`Automation`]: Toggle the downstream download automation for a resource
//! - [`Notifier`]: Deliver human-readable messages
//! - [`LedgerStore`]: Durable persistence of the throttle-history ledger

pub mod status_source;
pub mod automation;
pub mod notifier;
pub mod ledger_store;

pub use status_source::{ServerRef, ServerStatus, StatusSource, StatusSourceFactory};
pub use automation::Automation;
pub use notifier::Notifier;
pub use ledger_store::{EventKind, Ledger, LedgerEntry, LedgerStore, ThrottleEvent, MAX_EVENTS};
