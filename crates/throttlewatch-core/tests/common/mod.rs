//! Test doubles and common utilities for engine contract tests
//!
//! Every double is `Clone` and shares its state between clones: hand one
//! clone to the engine, keep the other to script and inspect.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use throttlewatch_core::config::EngineConfig;
use throttlewatch_core::error::{Error, Result};
use throttlewatch_core::ledger::MemoryLedgerStore;
use throttlewatch_core::traits::{
    Automation, Ledger, LedgerStore, Notifier, ServerRef, ServerStatus, StatusSource,
};
use throttlewatch_core::{AccountSource, Clock, EngineEvent, Reconciler, TrafficCounters};
use tokio::sync::mpsc;

/// Build a status with all required fields
pub fn status(ip: &str, throttled: bool) -> ServerStatus {
    ServerStatus {
        ipv4: Some(ip.to_string()),
        throttled: Some(throttled),
        traffic: TrafficCounters::new(2048, 1024),
        operational_status: Some("RUNNING".to_string()),
    }
}

/// A status source whose servers are scripted by the test
#[derive(Clone)]
pub struct ScriptedStatusSource {
    account_id: String,
    /// server_id -> (display name, status or error message)
    servers: Arc<Mutex<BTreeMap<String, (String, std::result::Result<ServerStatus, String>)>>>,
    listing_fails: Arc<AtomicBool>,
    fetch_call_count: Arc<AtomicUsize>,
}

impl ScriptedStatusSource {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            servers: Arc::new(Mutex::new(BTreeMap::new())),
            listing_fails: Arc::new(AtomicBool::new(false)),
            fetch_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set (or replace) the status a server reports
    pub fn set(&self, server_id: &str, name: &str, status: ServerStatus) {
        self.servers
            .lock()
            .unwrap()
            .insert(server_id.to_string(), (name.to_string(), Ok(status)));
    }

    /// Make the detail request of a server fail
    pub fn fail(&self, server_id: &str, name: &str) {
        self.servers.lock().unwrap().insert(
            server_id.to_string(),
            (name.to_string(), Err("connection reset".to_string())),
        );
    }

    /// Make the server listing fail
    pub fn fail_listing(&self, fails: bool) {
        self.listing_fails.store(fails, Ordering::SeqCst);
    }

    pub fn fetch_call_count(&self) -> usize {
        self.fetch_call_count.load(Ordering::SeqCst)
    }

    pub fn slot(&self) -> AccountSource {
        AccountSource::Ready(Box::new(self.clone()))
    }
}

#[async_trait]
impl StatusSource for ScriptedStatusSource {
    fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn list_servers(&self) -> Result<Vec<ServerRef>> {
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(Error::http("listing unavailable"));
        }
        Ok(self
            .servers
            .lock()
            .unwrap()
            .iter()
            .map(|(id, (name, _))| ServerRef::new(id.clone(), name.clone()))
            .collect())
    }

    async fn fetch_status(&self, server: &ServerRef) -> Result<ServerStatus> {
        self.fetch_call_count.fetch_add(1, Ordering::SeqCst);
        match self.servers.lock().unwrap().get(&server.server_id) {
            Some((_, Ok(status))) => Ok(status.clone()),
            Some((_, Err(message))) => Err(Error::http(message.clone())),
            None => Err(Error::not_found(server.server_id.clone())),
        }
    }
}

/// An automation that records every call
#[derive(Clone, Default)]
pub struct MockAutomation {
    calls: Arc<Mutex<Vec<(String, String)>>>,
    failing: Arc<AtomicBool>,
}

impl MockAutomation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail (the call is still recorded)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Recorded calls as (action, resource id)
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, action: &str, resource_id: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((action.to_string(), resource_id.to_string()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::automation("downloader unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl Automation for MockAutomation {
    async fn enable(&self, resource_id: &str) -> Result<()> {
        self.record("enable", resource_id)
    }

    async fn disable(&self, resource_id: &str) -> Result<()> {
        self.record("disable", resource_id)
    }

    fn name(&self) -> &'static str {
        "mock-automation"
    }
}

/// A notifier that records every delivered text
#[derive(Clone, Default)]
pub struct MockNotifier {
    texts: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn deliver(&self, text: &str) -> Result<()> {
        self.texts.lock().unwrap().push(text.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::notifier("chat unreachable"));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock-notifier"
    }
}

/// A memory ledger store whose load and save can be made to fail
#[derive(Clone, Default)]
pub struct FlakyLedgerStore {
    inner: MemoryLedgerStore,
    load_fails: Arc<AtomicBool>,
    save_fails: Arc<AtomicBool>,
    load_call_count: Arc<AtomicUsize>,
    save_call_count: Arc<AtomicUsize>,
}

impl FlakyLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_load_fails(&self, fails: bool) {
        self.load_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_save_fails(&self, fails: bool) {
        self.save_fails.store(fails, Ordering::SeqCst);
    }

    pub fn load_call_count(&self) -> usize {
        self.load_call_count.load(Ordering::SeqCst)
    }

    pub fn save_call_count(&self) -> usize {
        self.save_call_count.load(Ordering::SeqCst)
    }

    /// What is durably stored right now
    pub async fn stored(&self) -> Ledger {
        self.inner.load().await.unwrap()
    }
}

#[async_trait]
impl LedgerStore for FlakyLedgerStore {
    async fn load(&self) -> Result<Ledger> {
        self.load_call_count.fetch_add(1, Ordering::SeqCst);
        if self.load_fails.load(Ordering::SeqCst) {
            return Err(Error::ledger_store("disk unavailable"));
        }
        self.inner.load().await
    }

    async fn save(&self, ledger: &Ledger) -> Result<()> {
        self.save_call_count.fetch_add(1, Ordering::SeqCst);
        if self.save_fails.load(Ordering::SeqCst) {
            return Err(Error::ledger_store("disk full"));
        }
        self.inner.save(ledger).await
    }
}

/// A clock that only moves when told to
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap())),
        }
    }

    pub fn advance(&self, secs: i64) {
        *self.now.lock().unwrap() += Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Helper to create a minimal EngineConfig for testing
pub fn minimal_config() -> EngineConfig {
    EngineConfig {
        poll_interval_secs: 300,
        retry_delay_secs: 60,
        event_channel_capacity: 100,
    }
}

/// Everything a scenario test needs to drive and inspect one engine
pub struct Harness {
    pub reconciler: Reconciler,
    pub events: mpsc::Receiver<EngineEvent>,
    pub source: ScriptedStatusSource,
    pub automation: MockAutomation,
    pub notifier: MockNotifier,
    pub store: FlakyLedgerStore,
    pub clock: ManualClock,
}

impl Harness {
    /// One account, automation and notifier attached
    pub fn new() -> Self {
        let source = ScriptedStatusSource::new("acct-1");
        Self::with_accounts(source.clone(), vec![source.slot()])
    }

    /// Custom account slots; `source` is the handle tests script
    pub fn with_accounts(source: ScriptedStatusSource, accounts: Vec<AccountSource>) -> Self {
        let automation = MockAutomation::new();
        let notifier = MockNotifier::new();
        let store = FlakyLedgerStore::new();
        let clock = ManualClock::new();

        let (reconciler, events) =
            Reconciler::new(accounts, Box::new(store.clone()), &minimal_config())
                .expect("engine construction succeeds");
        let reconciler = reconciler
            .with_automation(Arc::new(automation.clone()))
            .with_notifier(Arc::new(notifier.clone()))
            .with_clock(Arc::new(clock.clone()));

        Self {
            reconciler,
            events,
            source,
            automation,
            notifier,
            store,
            clock,
        }
    }

    /// Drain all events emitted so far
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
