use std::sync::Arc;

use access_quota_tracker::access::{AccessController, AccessRegistry, Authorization};
use access_quota_tracker::storage::{MemoryRecordStore, RecordStore};
use access_quota_tracker::tracker::{
    ManualClock, QuotaError, QuotaManager, RolloverAnchor, WindowPolicy,
};
use chrono::{Duration, TimeZone, Utc};

const OWNER: &str = "1618920755";

struct Harness {
    quota_store: Arc<MemoryRecordStore>,
    registry_store: Arc<MemoryRecordStore>,
    controller: AccessController,
}

fn harness() -> Harness {
    let quota_store = Arc::new(MemoryRecordStore::new());
    let registry_store = Arc::new(MemoryRecordStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap(),
    ));
    let manager = Arc::new(QuotaManager::new(
        quota_store.clone(),
        clock.clone(),
        WindowPolicy::new(2, Duration::days(7), RolloverAnchor::Schedule),
    ));
    let controller = AccessController::new(
        manager,
        AccessRegistry::new(registry_store.clone()),
        clock,
        Some(OWNER.to_string()),
    );
    Harness {
        quota_store,
        registry_store,
        controller,
    }
}

#[tokio::test]
async fn owner_bypasses_quota_entirely() {
    let h = harness();

    for _ in 0..5 {
        assert_eq!(
            h.controller.authorize(OWNER).await.unwrap(),
            Authorization::Owner
        );
    }
    assert!(h.quota_store.is_empty());

    let reply = h.controller.handle(OWNER, "/add gateway|10.0.0.1").await;
    assert_eq!(reply, "IP 10.0.0.1 added (owner).");
    assert!(h.quota_store.is_empty());
}

#[tokio::test]
async fn add_spends_quota_and_registers_entry() {
    let h = harness();

    let reply = h.controller.handle("42", "/add laptop|192.168.0.10").await;
    assert_eq!(reply, "IP 192.168.0.10 added. Remaining quota: 1");

    let entries = h.registry_store.find(&[("userId", "42")]).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].text("name").as_deref(), Some("laptop"));
    assert_eq!(entries[0].text("ip").as_deref(), Some("192.168.0.10"));

    let listing = h.controller.handle("42", "/list").await;
    assert_eq!(listing, "Your IPs:\n- laptop: 192.168.0.10");
}

#[tokio::test]
async fn exhausted_user_sees_reset_time_and_nothing_is_registered() {
    let h = harness();
    h.controller.handle("42", "/add a|10.0.0.1").await;
    h.controller.handle("42", "/add b|10.0.0.2").await;

    let reply = h.controller.handle("42", "/add c|10.0.0.3").await;

    assert_eq!(
        reply,
        "Your quota is used up. It resets on 10/06/2024 09:30:00 UTC."
    );
    assert_eq!(h.registry_store.len(), 2);
    assert!(matches!(
        h.controller.authorize("42").await,
        Err(QuotaError::Exhausted { .. })
    ));
}

#[tokio::test]
async fn store_outage_reports_generic_retry_without_mutation() {
    let h = harness();
    h.quota_store.set_fail_writes(true);

    let reply = h.controller.handle("42", "/add a|10.0.0.1").await;

    assert_eq!(reply, "Something went wrong. Please try again later.");
    // The entry written before the refused spend was withdrawn.
    assert!(h.registry_store.is_empty());
    assert!(h.quota_store.is_empty());
}

#[tokio::test]
async fn failed_registry_write_costs_no_quota() {
    let h = harness();
    h.registry_store.set_fail_writes(true);

    let reply = h.controller.handle("42", "/add a|10.0.0.1").await;

    assert_eq!(reply, "Could not add IP 10.0.0.1. Please try again later.");
    assert!(h.registry_store.is_empty());
    assert_eq!(h.quota_store.write_count(), 0);
    assert!(h.controller.handle("42", "/quota").await.contains("- Remaining: 2"));

    h.registry_store.set_fail_writes(false);
    assert_eq!(
        h.controller.handle("42", "/add a|10.0.0.1").await,
        "IP 10.0.0.1 added. Remaining quota: 1"
    );
}

#[tokio::test]
async fn check_reports_without_spending() {
    let h = harness();

    assert_eq!(
        h.controller.check("42").await.unwrap(),
        Authorization::Granted { remaining: 2 }
    );
    assert_eq!(h.controller.check(OWNER).await.unwrap(), Authorization::Owner);
    assert_eq!(h.quota_store.write_count(), 0);
}

#[tokio::test]
async fn invalid_input_does_not_touch_quota() {
    let h = harness();

    assert_eq!(
        h.controller.handle("42", "/add 10.0.0.1").await,
        "Invalid format. Use: /add name|IP"
    );
    assert_eq!(
        h.controller.handle("42", "/add lab|10.0.0").await,
        "Invalid IP address."
    );
    assert_eq!(h.quota_store.write_count(), 0);
}

#[tokio::test]
async fn quota_command_reports_status() {
    let h = harness();
    h.controller.handle("42", "/add a|10.0.0.1").await;

    let reply = h.controller.handle("42", "/quota").await;

    assert_eq!(
        reply,
        "Your quota:\n- Remaining: 1\n- Total added: 1\n- Next reset: 10/06/2024 09:30:00 UTC"
    );
    assert_eq!(h.controller.handle("42", "/ceklimit").await, reply);
    assert_eq!(
        h.controller.handle(OWNER, "/quota").await,
        "You are the owner; no quota applies."
    );
}

#[tokio::test]
async fn remove_is_owner_only() {
    let h = harness();
    h.controller.handle("42", "/add a|10.0.0.1").await;
    h.controller.handle("43", "/add b|10.0.0.1").await;

    assert_eq!(
        h.controller.handle("42", "/remove 10.0.0.1").await,
        "Only the owner can use this command."
    );
    assert_eq!(
        h.controller.handle(OWNER, "/remove 10.0.0.1").await,
        "IP 10.0.0.1 removed."
    );
    assert!(h.registry_store.is_empty());
    assert_eq!(
        h.controller.handle(OWNER, "/remove 10.0.0.1").await,
        "IP 10.0.0.1 not found."
    );
}

#[tokio::test]
async fn help_lists_owner_commands_only_for_owner() {
    let h = harness();

    assert!(!h.controller.handle("42", "/help").await.contains("/remove"));
    assert!(h.controller.handle(OWNER, "/help").await.contains("/remove IP"));
    assert_eq!(
        h.controller.handle("42", "/list").await,
        "You have not added any IP yet."
    );
    assert!(h
        .controller
        .handle("42", "hello there")
        .await
        .starts_with("Unknown command"));
}
