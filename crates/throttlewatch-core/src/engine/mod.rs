//! Reconciliation engine
//!
//! The Reconciler is responsible for:
//! - Polling every configured account for its servers
//! - Classifying each observation against the ledger
//! - Driving the downstream automation once per genuine transition
//! - Persisting the ledger once per cycle
//! - Publishing the read-side snapshot
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ StatusSource │─── Observation ───┐   (one per account)
//! └──────────────┘                   │
//!                                    ▼
//!                           ┌──────────────┐      ┌─────────────┐
//!                           │  Reconciler  │─────▶│ LedgerStore │
//!                           └──────────────┘      └─────────────┘
//!                                    │
//!         ┌──────────────────────────┼──────────────────────────┐
//!         │                          │                          │
//!         ▼                          ▼                          ▼
//! ┌─────────────┐           ┌──────────────┐           ┌─────────────┐
//! │ Automation  │           │   Notifier   │           │ StatusCache │
//! │ (toggle)    │           │ (best-effort)│           │  (publish)  │
//! └─────────────┘           └──────────────┘           └─────────────┘
//! ```
//!
//! ## Cycle Flow
//!
//! 1. Collect observations from every account (last write wins per resource)
//! 2. Detect transitions against the ledger
//! 3. Mutate the ledger, then call automation and notifier
//! 4. Save the ledger once
//! 5. Swap in the new cache snapshot
//!
//! Failures are contained to the account or resource they occur in. The
//! only failure that aborts a cycle is a ledger that cannot be loaded.

pub mod messages;
pub mod scheduler;

pub use scheduler::PollScheduler;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheSnapshot, StatusCache};
use crate::config::{AccountConfig, EngineConfig};
use crate::detector::{Detection, detect};
use crate::error::{Error, Result};
use crate::model::{Clock, Observation, SystemClock};
use crate::traits::{
    Automation, Ledger, LedgerEntry, LedgerStore, Notifier, StatusSource, StatusSourceFactory,
};

/// Events emitted by the Reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A cycle started
    CycleStarted {
        cycle: u64,
    },

    /// An account was skipped for this cycle
    AccountSkipped {
        account_id: String,
        reason: String,
    },

    /// A server was skipped for this cycle
    ResourceSkipped {
        account_id: String,
        server: String,
        reason: String,
    },

    /// A resource was seen for the first time
    FirstObservation {
        resource_id: String,
        throttled: bool,
    },

    /// A resource became throttled
    Throttled {
        resource_id: String,
        throttle_count: u64,
    },

    /// A resource left the throttled state
    Unthrottled {
        resource_id: String,
        duration_seconds: u64,
        total_throttled_seconds: u64,
    },

    /// The downstream automation call failed
    AutomationFailed {
        resource_id: String,
        action: AutomationAction,
        error: String,
    },

    /// A notification could not be delivered
    NotificationFailed {
        error: String,
    },

    /// The ledger could not be persisted
    LedgerSaveFailed {
        error: String,
    },

    /// The cycle failed before any resource was processed
    CycleFailed {
        error: String,
    },

    /// A cycle finished
    CycleCompleted {
        report: CycleReport,
    },

    /// The scheduler stopped
    Stopped {
        reason: String,
    },
}

/// Downstream automation action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationAction {
    Enable,
    Disable,
}

impl AutomationAction {
    /// Action that matches a throttle flag
    pub fn for_throttled(throttled: bool) -> Self {
        if throttled {
            AutomationAction::Disable
        } else {
            AutomationAction::Enable
        }
    }
}

impl fmt::Display for AutomationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutomationAction::Enable => write!(f, "enable"),
            AutomationAction::Disable => write!(f, "disable"),
        }
    }
}

/// Summary of one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Resources observed this cycle (after merging accounts)
    pub observed: usize,
    /// Resources seen for the first time
    pub first_observations: usize,
    /// Genuine transitions
    pub transitions: usize,
    /// Accounts skipped
    pub skipped_accounts: usize,
    /// Servers skipped
    pub skipped_resources: usize,
    /// Whether the ledger save succeeded
    pub ledger_saved: bool,
}

/// One configured account, as the engine sees it
pub enum AccountSource {
    /// Credentials complete, client built
    Ready(Box<dyn StatusSource>),
    /// Credentials incomplete; skipped every cycle
    Incomplete {
        account_id: String,
        missing: Vec<&'static str>,
    },
    /// The client could not be built; skipped every cycle
    Unavailable {
        account_id: String,
        reason: String,
    },
}

impl AccountSource {
    /// Build the account slot for a configured account
    ///
    /// Never fails: incomplete or unbuildable accounts become slots that are
    /// logged and skipped on every cycle.
    pub fn from_config(account: &AccountConfig, factory: &dyn StatusSourceFactory) -> Self {
        let missing = account.missing_fields();
        if !missing.is_empty() {
            return AccountSource::Incomplete {
                account_id: account.label().to_string(),
                missing,
            };
        }

        match factory.create(account) {
            Ok(source) => AccountSource::Ready(source),
            Err(e) => AccountSource::Unavailable {
                account_id: account.label().to_string(),
                reason: e.to_string(),
            },
        }
    }
}

impl fmt::Debug for AccountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountSource::Ready(source) => f
                .debug_tuple("Ready")
                .field(&source.account_id())
                .finish(),
            AccountSource::Incomplete {
                account_id,
                missing,
            } => f
                .debug_struct("Incomplete")
                .field("account_id", account_id)
                .field("missing", missing)
                .finish(),
            AccountSource::Unavailable { account_id, reason } => f
                .debug_struct("Unavailable")
                .field("account_id", account_id)
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Observations gathered in one cycle
#[derive(Default)]
struct Collected {
    observations: BTreeMap<String, Observation>,
    skipped_accounts: usize,
    skipped_resources: usize,
}

/// Reconciliation engine
///
/// Owns the in-memory ledger (the only mutation path into it) and runs one
/// poll cycle per [`Reconciler::run_cycle`] call. Cycles are serial by
/// construction: `run_cycle` takes `&mut self`.
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`], attach collaborators with the
///    `with_*` methods
/// 2. Drive with a [`PollScheduler`] (or call `run_cycle` directly)
/// 3. Read results through the [`StatusCache`] handle
pub struct Reconciler {
    /// One slot per configured account, in configuration order
    accounts: Vec<AccountSource>,

    /// Durable ledger persistence
    ledger_store: Box<dyn LedgerStore>,

    /// In-memory ledger (`None` until the first successful load)
    ledger: Option<Ledger>,

    /// Downstream automation (optional)
    automation: Option<Arc<dyn Automation>>,

    /// Notification channel (optional)
    notifier: Option<Arc<dyn Notifier>>,

    /// Read-side snapshot
    cache: StatusCache,

    /// Time source
    clock: Arc<dyn Clock>,

    /// Cycles started so far
    cycle: u64,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Parameters
    ///
    /// - `accounts`: One slot per configured account
    /// - `ledger_store`: Ledger persistence
    /// - `config`: Engine configuration
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver) where event_receiver yields engine events
    pub fn new(
        accounts: Vec<AccountSource>,
        ledger_store: Box<dyn LedgerStore>,
        config: &EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let reconciler = Self {
            accounts,
            ledger_store,
            ledger: None,
            automation: None,
            notifier: None,
            cache: StatusCache::new(),
            clock: Arc::new(SystemClock),
            cycle: 0,
            event_tx: tx,
        };

        Ok((reconciler, rx))
    }

    /// Attach the downstream automation
    pub fn with_automation(mut self, automation: Arc<dyn Automation>) -> Self {
        self.automation = Some(automation);
        self
    }

    /// Attach the notification channel
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish into an existing cache handle
    pub fn with_cache(mut self, cache: StatusCache) -> Self {
        self.cache = cache;
        self
    }

    /// Handle to the read-side cache
    pub fn cache(&self) -> StatusCache {
        self.cache.clone()
    }

    /// The in-memory ledger (`None` before the first successful load)
    pub fn ledger(&self) -> Option<&Ledger> {
        self.ledger.as_ref()
    }

    /// Run one full poll cycle
    ///
    /// # Returns
    ///
    /// - `Ok(CycleReport)`: The cycle completed; individual accounts,
    ///   servers, downstream calls or the save may still have failed (see
    ///   the report and the emitted events)
    /// - `Err(Error)`: The ledger could not be loaded; nothing was processed
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.cycle += 1;
        self.emit_event(EngineEvent::CycleStarted { cycle: self.cycle });
        debug!("Starting cycle {}", self.cycle);

        let mut ledger = match self.ledger.take() {
            Some(ledger) => ledger,
            None => match self.ledger_store.load().await {
                Ok(ledger) => {
                    info!("Loaded ledger with {} entries", ledger.len());
                    ledger
                }
                Err(e) => {
                    error!(class = %e.class(), "Failed to load ledger: {}", e);
                    self.emit_event(EngineEvent::CycleFailed {
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            },
        };

        let collected = self.collect_observations().await;

        let mut report = CycleReport {
            observed: collected.observations.len(),
            skipped_accounts: collected.skipped_accounts,
            skipped_resources: collected.skipped_resources,
            ..Default::default()
        };

        for obs in collected.observations.values() {
            self.reconcile(&mut ledger, obs, &mut report).await;
        }

        match self.ledger_store.save(&ledger).await {
            Ok(()) => report.ledger_saved = true,
            Err(e) => {
                error!(class = %e.class(), "Failed to save ledger, keeping it in memory: {}", e);
                self.emit_event(EngineEvent::LedgerSaveFailed {
                    error: e.to_string(),
                });
            }
        }

        self.publish(&ledger, collected.observations).await;
        self.ledger = Some(ledger);

        info!(
            "Cycle {} complete: {} observed, {} new, {} transitions, {} accounts skipped, {} servers skipped",
            self.cycle,
            report.observed,
            report.first_observations,
            report.transitions,
            report.skipped_accounts,
            report.skipped_resources
        );
        self.emit_event(EngineEvent::CycleCompleted {
            report: report.clone(),
        });

        Ok(report)
    }

    /// Gather observations from every account
    async fn collect_observations(&self) -> Collected {
        let mut collected = Collected::default();

        for account in &self.accounts {
            let source = match account {
                AccountSource::Ready(source) => source,
                AccountSource::Incomplete {
                    account_id,
                    missing,
                } => {
                    let error = Error::config_incomplete(account_id.clone(), missing);
                    warn!(class = %error.class(), "Skipping account: {}", error);
                    collected.skipped_accounts += 1;
                    self.emit_event(EngineEvent::AccountSkipped {
                        account_id: account_id.clone(),
                        reason: error.to_string(),
                    });
                    continue;
                }
                AccountSource::Unavailable { account_id, reason } => {
                    warn!("Skipping account {}: {}", account_id, reason);
                    collected.skipped_accounts += 1;
                    self.emit_event(EngineEvent::AccountSkipped {
                        account_id: account_id.clone(),
                        reason: reason.clone(),
                    });
                    continue;
                }
            };

            let account_id = source.account_id();
            let servers = match source.list_servers().await {
                Ok(servers) => servers,
                Err(e) => {
                    warn!(
                        class = %e.class(),
                        %account_id,
                        "Failed to list servers for account {}: {}",
                        account_id,
                        e
                    );
                    collected.skipped_accounts += 1;
                    self.emit_event(EngineEvent::AccountSkipped {
                        account_id: account_id.to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if servers.is_empty() {
                warn!("Account {} has no servers", account_id);
            }

            for server in servers {
                let observation = match source.fetch_status(&server).await {
                    Ok(status) => {
                        Observation::from_status(account_id, &server, status, self.clock.now())
                    }
                    Err(e) => Err(e),
                };

                match observation {
                    Ok(obs) => {
                        debug!(
                            "Observed {} ({}): throttled={}",
                            obs.display_name, obs.resource_id, obs.throttled
                        );
                        let resource_id = obs.resource_id.clone();
                        if let Some(previous) = collected.observations.insert(resource_id, obs)
                            && previous.account_id != account_id
                        {
                            debug!(
                                "Resource {} reported by accounts {} and {}, keeping the latter",
                                previous.resource_id, previous.account_id, account_id
                            );
                        }
                    }
                    Err(e) => {
                        warn!(
                            class = %e.class(),
                            "Skipping server {} of account {} this cycle: {}",
                            server.display_name, account_id, e
                        );
                        collected.skipped_resources += 1;
                        self.emit_event(EngineEvent::ResourceSkipped {
                            account_id: account_id.to_string(),
                            server: server.display_name.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        collected
    }

    /// Apply one observation to the ledger and drive its side effects
    ///
    /// The ledger is mutated before any downstream call, so a failing call
    /// never causes the same transition to be reported again.
    async fn reconcile(&self, ledger: &mut Ledger, obs: &Observation, report: &mut CycleReport) {
        let at = obs.observed_at;

        match detect(ledger.get(&obs.resource_id), obs.throttled) {
            Detection::FirstObservation => {
                info!(
                    "First observation of {} ({}): throttled={}",
                    obs.display_name, obs.resource_id, obs.throttled
                );
                ledger.insert(
                    obs.resource_id.clone(),
                    LedgerEntry::baseline(&obs.display_name, obs.throttled, at),
                );
                report.first_observations += 1;
                self.emit_event(EngineEvent::FirstObservation {
                    resource_id: obs.resource_id.clone(),
                    throttled: obs.throttled,
                });

                self.apply_automation(obs, AutomationAction::for_throttled(obs.throttled))
                    .await;
            }

            Detection::Transition { to: true, .. } => {
                let Some(entry) = ledger.get_mut(&obs.resource_id) else {
                    return;
                };
                refresh_display_name(entry, obs);
                entry.record_throttled(at);
                report.transitions += 1;

                warn!(
                    "{} ({}) is throttled (count: {})",
                    obs.display_name, obs.resource_id, entry.throttle_count
                );
                self.emit_event(EngineEvent::Throttled {
                    resource_id: obs.resource_id.clone(),
                    throttle_count: entry.throttle_count,
                });

                let text = messages::throttled(obs, entry);
                self.apply_automation(obs, AutomationAction::Disable).await;
                self.notify(&text).await;
            }

            Detection::Transition { to: false, .. } => {
                let Some(entry) = ledger.get_mut(&obs.resource_id) else {
                    return;
                };
                refresh_display_name(entry, obs);
                let duration = entry.record_unthrottled(at);
                report.transitions += 1;

                info!(
                    "{} ({}) is no longer throttled after {}s (total {}s)",
                    obs.display_name, obs.resource_id, duration, entry.total_throttled_seconds
                );
                self.emit_event(EngineEvent::Unthrottled {
                    resource_id: obs.resource_id.clone(),
                    duration_seconds: duration,
                    total_throttled_seconds: entry.total_throttled_seconds,
                });

                let text = messages::unthrottled(obs, duration, entry);
                self.apply_automation(obs, AutomationAction::Enable).await;
                self.notify(&text).await;
            }

            Detection::NoChange => {
                if let Some(entry) = ledger.get_mut(&obs.resource_id) {
                    refresh_display_name(entry, obs);
                }
                debug!("{} unchanged", obs.resource_id);
            }
        }
    }

    /// Invoke the downstream automation once, without retry
    async fn apply_automation(&self, obs: &Observation, action: AutomationAction) {
        let Some(automation) = &self.automation else {
            debug!("No automation configured, skipping {} of {}", action, obs.resource_id);
            return;
        };

        let result = match action {
            AutomationAction::Enable => automation.enable(&obs.resource_id).await,
            AutomationAction::Disable => automation.disable(&obs.resource_id).await,
        };

        match result {
            Ok(()) => info!(
                "{}: {} downloader for {}",
                automation.name(),
                action,
                obs.resource_id
            ),
            Err(e) => {
                error!(
                    class = %e.class(),
                    resource_id = %obs.resource_id,
                    "{}: failed to {} downloader for {}: {}",
                    automation.name(),
                    action,
                    obs.resource_id,
                    e
                );
                self.emit_event(EngineEvent::AutomationFailed {
                    resource_id: obs.resource_id.clone(),
                    action,
                    error: e.to_string(),
                });
                let text = messages::automation_failed(
                    action,
                    &obs.resource_id,
                    &e.to_string(),
                    self.clock.now(),
                );
                self.notify(&text).await;
            }
        }
    }

    /// Deliver a notification; failures are logged only
    async fn notify(&self, text: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        if let Err(e) = notifier.deliver(text).await {
            warn!(
                class = %e.class(),
                "{}: failed to deliver notification: {}",
                notifier.name(),
                e
            );
            self.emit_event(EngineEvent::NotificationFailed {
                error: e.to_string(),
            });
        }
    }

    /// Build and swap in the next cache snapshot
    ///
    /// Resources missing from this cycle keep their previous observation.
    async fn publish(&self, ledger: &Ledger, observations: BTreeMap<String, Observation>) {
        let previous = self.cache.snapshot().await;

        let mut servers = previous.servers.clone();
        servers.extend(observations);

        let ledger = servers
            .keys()
            .filter_map(|id| ledger.get(id).map(|entry| (id.clone(), entry.clone())))
            .collect();

        self.cache
            .publish(CacheSnapshot {
                updated_at: Some(self.clock.now()),
                cycles_completed: previous.cycles_completed + 1,
                servers,
                ledger,
            })
            .await;
    }

    /// Emit an engine event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    pub(crate) fn emit_event(&self, event: EngineEvent) {
        // Channel full means the consumer is slower than the engine; drop
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

fn refresh_display_name(entry: &mut LedgerEntry, obs: &Observation) {
    if entry.display_name != obs.display_name {
        debug!(
            "Display name of {} changed: {} -> {}",
            obs.resource_id, entry.display_name, obs.display_name
        );
        entry.display_name = obs.display_name.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_follows_throttle_flag() {
        assert_eq!(AutomationAction::for_throttled(true), AutomationAction::Disable);
        assert_eq!(AutomationAction::for_throttled(false), AutomationAction::Enable);
        assert_eq!(AutomationAction::Disable.to_string(), "disable");
    }

    #[test]
    fn engine_events_compare_by_value() {
        let event = EngineEvent::Unthrottled {
            resource_id: "10.0.0.1".to_string(),
            duration_seconds: 600,
            total_throttled_seconds: 600,
        };
        assert_eq!(event.clone(), event);
    }
}
