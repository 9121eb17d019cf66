use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use locus_common::{EventBus, RemoteError, SyncEvent, UserId};
use locus_config::{ConnectivityConfig, PresenceConfig};

use super::*;
use crate::backend::memory::{MemoryRealtimeStore, RealtimeOp};
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};

fn setup() -> (Arc<MemoryRealtimeStore>, PresenceTracker, EventBus) {
    setup_with(PresenceConfig::default())
}

fn setup_with(config: PresenceConfig) -> (Arc<MemoryRealtimeStore>, PresenceTracker, EventBus) {
    let store = Arc::new(MemoryRealtimeStore::new());
    let events = EventBus::new(32);
    let tracker = PresenceTracker::new(store.clone(), config, events.clone());
    (store, tracker, events)
}

fn sets(store: &MemoryRealtimeStore) -> Vec<serde_json::Value> {
    store
        .log()
        .into_iter()
        .filter_map(|op| match op {
            RealtimeOp::Set { value, .. } => Some(value),
            _ => None,
        })
        .collect()
}

fn alice() -> UserId {
    UserId::new("alice")
}

#[tokio::test(start_paused = true)]
async fn start_arms_fallback_before_online_write() {
    let (store, tracker, _) = setup();

    tracker.start(&alice()).await;
    tracker.wait_idle().await;

    let log = store.log();
    assert_eq!(log.len(), 2);
    assert!(matches!(&log[0], RealtimeOp::ArmDisconnect { path, value }
        if path == "status/alice" && value["state"] == "offline" && value["lastSeen"] == json!({".sv": "timestamp"})));
    assert!(matches!(&log[1], RealtimeOp::Set { path, value }
        if path == "status/alice" && value["state"] == "online"));
    assert!(tracker.is_online());
    assert!(tracker.last_seen().is_some());
    assert_eq!(tracker.tracked_user(), Some(alice()));
}

#[tokio::test(start_paused = true)]
async fn repeated_start_writes_online_once() {
    let (store, tracker, _) = setup();

    tracker.start(&alice()).await;
    tracker.start(&alice()).await;
    tracker.wait_idle().await;

    assert_eq!(sets(&store).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_fallback_before_offline_write() {
    let (store, tracker, _) = setup();

    tracker.start(&alice()).await;
    tracker.wait_idle().await;
    tracker.stop().await;

    let log = store.log();
    let n = log.len();
    assert!(matches!(&log[n - 2], RealtimeOp::CancelDisconnect { path } if path == "status/alice"));
    assert!(matches!(&log[n - 1], RealtimeOp::Set { value, .. } if value["state"] == "offline"));
    assert!(store.armed("status/alice").is_none());
    assert!(!tracker.is_online());
    assert_eq!(tracker.tracked_user(), None);

    // The connection dropping afterwards must not touch the record.
    assert_eq!(store.simulate_disconnect(), 0);
}

#[tokio::test(start_paused = true)]
async fn every_offline_write_follows_a_cancel() {
    let (store, tracker, _) = setup();

    tracker.start(&alice()).await;
    tracker.wait_idle().await;
    tracker.on_connectivity_change(ConnectivityEvent::Foreground(false));
    tracker.wait_idle().await;
    tracker.on_connectivity_change(ConnectivityEvent::Foreground(true));
    tracker.wait_idle().await;
    tracker.stop().await;

    let log = store.log();
    for (i, op) in log.iter().enumerate() {
        if let RealtimeOp::Set { value, .. } = op {
            if value["state"] == "offline" {
                assert!(matches!(log[i - 1], RealtimeOp::CancelDisconnect { .. }));
            } else {
                assert!(matches!(log[i - 1], RealtimeOp::ArmDisconnect { .. }));
            }
        }
    }
    let states: Vec<_> = sets(&store).iter().map(|v| v["state"].clone()).collect();
    assert_eq!(states, vec![json!("online"), json!("offline"), json!("online"), json!("offline")]);
}

#[tokio::test(start_paused = true)]
async fn unchanged_target_is_not_rewritten() {
    let (store, tracker, _) = setup();

    tracker.start(&alice()).await;
    tracker.wait_idle().await;
    tracker.on_connectivity_change(ConnectivityEvent::Connected(true));
    tracker.on_connectivity_change(ConnectivityEvent::Foreground(true));
    tracker.wait_idle().await;

    assert_eq!(sets(&store).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn connectivity_before_start_is_remembered() {
    let (store, tracker, _) = setup();

    tracker.on_connectivity_change(ConnectivityEvent::Foreground(false));
    assert!(store.log().is_empty());

    tracker.start(&alice()).await;
    tracker.wait_idle().await;

    let states: Vec<_> = sets(&store).iter().map(|v| v["state"].clone()).collect();
    assert_eq!(states, vec![json!("offline")]);
}

#[tokio::test(start_paused = true)]
async fn timeout_is_retried_once() {
    let (store, tracker, _) = setup();
    store.fail_next(RemoteError::Timeout(5000));

    tracker.start(&alice()).await;
    tracker.wait_idle().await;

    assert_eq!(store.failed_ops(), 1);
    assert_eq!(store.value("status/alice").unwrap()["state"], "online");
    assert!(tracker.is_online());
}

#[tokio::test(start_paused = true)]
async fn second_failure_is_dropped_and_reported() {
    let (store, tracker, events) = setup();
    let mut rx = events.subscribe();
    store.fail_next(RemoteError::Timeout(5000));
    store.fail_next(RemoteError::Unavailable("offline".into()));

    tracker.start(&alice()).await;
    tracker.wait_idle().await;

    assert!(store.value("status/alice").is_none());
    assert!(!tracker.is_online());
    assert!(matches!(rx.try_recv(), Ok(SyncEvent::RemoteWriteFailed { operation, .. }) if operation == "presence.online"));

    // Dropped, not queued: the same target is not re-sent.
    tracker.on_connectivity_change(ConnectivityEvent::Connected(true));
    tracker.wait_idle().await;
    assert!(sets(&store).is_empty());
}

#[tokio::test(start_paused = true)]
async fn authorization_failure_is_swallowed() {
    let (store, tracker, events) = setup();
    let mut rx = events.subscribe();
    store.fail_next(RemoteError::Unauthorized("expired".into()));

    tracker.start(&alice()).await;
    tracker.wait_idle().await;

    assert_eq!(store.failed_ops(), 1);
    assert!(store.log().is_empty());
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn stop_abandons_pending_retry() {
    let (store, tracker, _) = setup();
    store.fail_next(RemoteError::Timeout(5000));

    tracker.start(&alice()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    tracker.stop().await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let log = store.log();
    assert_eq!(log.len(), 2);
    assert!(matches!(log[0], RealtimeOp::CancelDisconnect { .. }));
    assert!(matches!(&log[1], RealtimeOp::Set { value, .. } if value["state"] == "offline"));
}

#[tokio::test(start_paused = true)]
async fn switching_users_stops_the_previous_one() {
    let (store, tracker, _) = setup();

    tracker.start(&alice()).await;
    tracker.wait_idle().await;
    tracker.start(&UserId::new("bob")).await;
    tracker.wait_idle().await;

    assert_eq!(store.value("status/alice").unwrap()["state"], "offline");
    assert_eq!(store.value("status/bob").unwrap()["state"], "online");
    assert!(store.armed("status/alice").is_none());
    assert!(store.armed("status/bob").is_some());
    assert_eq!(tracker.tracked_user(), Some(UserId::new("bob")));
}

#[tokio::test(start_paused = true)]
async fn disabled_tracking_writes_nothing() {
    let (store, tracker, _) = setup_with(PresenceConfig {
        enabled: false,
        ..PresenceConfig::default()
    });

    tracker.start(&alice()).await;
    tracker.wait_idle().await;

    assert!(store.log().is_empty());
    assert_eq!(tracker.tracked_user(), None);
}

#[tokio::test(start_paused = true)]
async fn ungraceful_exit_leaves_fallback_record() {
    let (store, tracker, _) = setup();

    tracker.start(&alice()).await;
    tracker.wait_idle().await;
    let online_at = store.value("status/alice").unwrap()["lastSeen"].as_i64().unwrap();

    assert_eq!(store.simulate_disconnect(), 1);
    let record = store.value("status/alice").unwrap();
    assert_eq!(record["state"], "offline");
    assert!(record["lastSeen"].as_i64().unwrap() >= online_at);
}

#[tokio::test(start_paused = true)]
async fn flapping_produces_at_most_one_transition() {
    let (store, tracker, _) = setup();
    let tracker = Arc::new(tracker);
    let monitor = ConnectivityMonitor::spawn(&ConnectivityConfig::default());
    let subscriber = tracker.clone();
    monitor.subscribe(move |event| subscriber.on_connectivity_change(event));

    tracker.start(&alice()).await;
    tracker.wait_idle().await;

    for _ in 0..10 {
        monitor.report_reachability(false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.report_reachability(true);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    monitor.report_reachability(false);
    tokio::time::sleep(Duration::from_secs(5)).await;
    tracker.wait_idle().await;

    let states: Vec<_> = sets(&store).iter().map(|v| v["state"].clone()).collect();
    assert_eq!(states, vec![json!("online"), json!("offline")]);
}
