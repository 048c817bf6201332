//! Contract Test: Failure Containment
//!
//! Verifies that failures stay inside the account or resource they occur in.
//!
//! Constraints verified:
//! - Incomplete or failing accounts are skipped, others still processed
//! - Unreadable servers are skipped without a transition, stale cache kept
//! - A failed save keeps the in-memory ledger authoritative
//! - A failed ledger load fails only that cycle
//! - Notifier failures never affect ledger or automation
//!
//! If this test fails, someone has:
//! - Propagated a per-account error out of the cycle
//! - Treated a missing observation as a state change
//! - Made the notifier part of the critical path

mod common;

use common::*;
use throttlewatch_core::{AccountSource, EngineEvent, ErrorClass};

#[tokio::test]
async fn incomplete_account_is_skipped_every_cycle() {
    let good = ScriptedStatusSource::new("good");
    good.set("1", "a", status("10.0.0.1", false));

    let accounts = vec![
        AccountSource::Incomplete {
            account_id: "broken".to_string(),
            missing: vec!["refresh_token"],
        },
        good.slot(),
    ];
    let mut h = Harness::with_accounts(good, accounts);

    for _ in 0..2 {
        let report = h.reconciler.run_cycle().await.unwrap();
        assert_eq!(report.skipped_accounts, 1);
        assert_eq!(report.observed, 1);
    }

    let events = h.drain_events();
    let skipped: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::AccountSkipped { account_id, reason } => Some((account_id, reason)),
            _ => None,
        })
        .collect();
    assert_eq!(skipped.len(), 2);
    assert_eq!(skipped[0].0, "broken");
    assert!(skipped[0].1.contains("refresh_token"));
}

#[tokio::test]
async fn failing_listing_skips_only_that_account() {
    let first = ScriptedStatusSource::new("first");
    let second = ScriptedStatusSource::new("second");
    first.set("1", "a", status("10.0.0.1", false));
    second.set("9", "z", status("10.0.0.9", true));
    first.fail_listing(true);

    let accounts = vec![first.slot(), second.slot()];
    let mut h = Harness::with_accounts(second.clone(), accounts);

    let report = h.reconciler.run_cycle().await.unwrap();
    assert_eq!(report.skipped_accounts, 1);
    assert_eq!(report.observed, 1);

    let ledger = h.reconciler.ledger().unwrap();
    assert!(ledger.contains_key("10.0.0.9"));
    assert!(!ledger.contains_key("10.0.0.1"));
}

#[tokio::test]
async fn unreadable_server_keeps_previous_cache_entry() {
    let mut h = Harness::new();
    h.source.set("1", "a", status("10.0.0.1", false));
    h.source.set("2", "b", status("10.0.0.2", true));
    h.reconciler.run_cycle().await.unwrap();

    let cache = h.reconciler.cache();
    let before = cache.snapshot().await.servers["10.0.0.2"].clone();

    h.source.fail("2", "b");
    let calls = h.automation.call_count();
    let report = h.reconciler.run_cycle().await.unwrap();

    assert_eq!(report.skipped_resources, 1);
    assert_eq!(report.transitions, 0);
    assert_eq!(h.automation.call_count(), calls, "a skipped server is not a transition");

    let snapshot = cache.snapshot().await;
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.servers["10.0.0.2"], before);
    assert!(h.reconciler.ledger().unwrap()["10.0.0.2"].current_throttled);
}

#[tokio::test]
async fn server_without_address_is_skipped() {
    let mut h = Harness::new();
    let mut partial = status("10.0.0.1", false);
    partial.ipv4 = None;
    h.source.set("1", "a", partial);
    h.source.set("2", "b", status("10.0.0.2", false));

    let report = h.reconciler.run_cycle().await.unwrap();
    assert_eq!(report.skipped_resources, 1);
    assert_eq!(report.observed, 1);
    assert_eq!(h.reconciler.ledger().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_resource_last_account_wins() {
    let first = ScriptedStatusSource::new("first");
    let second = ScriptedStatusSource::new("second");
    first.set("1", "from-first", status("10.0.0.1", false));
    second.set("7", "from-second", status("10.0.0.1", false));

    let accounts = vec![first.slot(), second.slot()];
    let mut h = Harness::with_accounts(second.clone(), accounts);

    let report = h.reconciler.run_cycle().await.unwrap();
    assert_eq!(report.observed, 1);
    assert_eq!(h.automation.call_count(), 1, "one call per resource per cycle");

    let snapshot = h.reconciler.cache().snapshot().await;
    let obs = &snapshot.servers["10.0.0.1"];
    assert_eq!(obs.account_id, "second");
    assert_eq!(obs.display_name, "from-second");
}

#[tokio::test]
async fn failed_save_keeps_memory_ledger_authoritative() {
    let mut h = Harness::new();
    h.source.set("1", "a", status("10.0.0.1", false));
    h.reconciler.run_cycle().await.unwrap();

    h.store.set_save_fails(true);
    h.source.set("1", "a", status("10.0.0.1", true));
    let report = h.reconciler.run_cycle().await.unwrap();
    assert!(!report.ledger_saved);
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::LedgerSaveFailed { .. })));

    // Nothing new is durable yet, but the engine does not re-detect
    assert!(!h.store.stored().await["10.0.0.1"].current_throttled);
    let calls = h.automation.call_count();
    h.reconciler.run_cycle().await.unwrap();
    assert_eq!(h.automation.call_count(), calls);

    // The next successful save catches up
    h.store.set_save_fails(false);
    let report = h.reconciler.run_cycle().await.unwrap();
    assert!(report.ledger_saved);
    assert_eq!(h.store.stored().await["10.0.0.1"].throttle_count, 1);
}

#[tokio::test]
async fn failed_load_fails_cycle_and_retries_next_time() {
    let mut h = Harness::new();
    h.source.set("1", "a", status("10.0.0.1", false));
    h.store.set_load_fails(true);

    let err = h.reconciler.run_cycle().await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::PersistenceFailure);
    assert!(h.reconciler.ledger().is_none());
    assert_eq!(h.automation.call_count(), 0);
    assert!(!h.reconciler.cache().is_warm().await);

    h.store.set_load_fails(false);
    let report = h.reconciler.run_cycle().await.unwrap();
    assert_eq!(report.first_observations, 1);
    assert_eq!(h.store.load_call_count(), 2);
}

#[tokio::test]
async fn notifier_failure_does_not_affect_state() {
    let mut h = Harness::new();
    h.notifier.set_failing(true);
    h.source.set("1", "a", status("10.0.0.1", false));
    h.reconciler.run_cycle().await.unwrap();

    h.source.set("1", "a", status("10.0.0.1", true));
    let report = h.reconciler.run_cycle().await.unwrap();

    assert_eq!(report.transitions, 1);
    assert!(report.ledger_saved);
    assert_eq!(h.reconciler.ledger().unwrap()["10.0.0.1"].throttle_count, 1);
    assert_eq!(h.automation.call_count(), 2);
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::NotificationFailed { .. })));
}
