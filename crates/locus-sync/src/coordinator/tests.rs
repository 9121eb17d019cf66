use std::sync::Arc;
use std::time::Duration;

use locus_common::{RemoteError, SyncError, SyncEvent, UserId};
use locus_config::LocusConfig;

use super::*;
use crate::backend::memory::{
    MemoryCache, MemoryDocumentStore, MemoryPushProvider, MemoryRealtimeStore,
};
use crate::backend::PermissionStatus;
use crate::model::{NotificationSettings, SettingKey};

struct Harness {
    documents: Arc<MemoryDocumentStore>,
    realtime: Arc<MemoryRealtimeStore>,
    cache: Arc<MemoryCache>,
    provider: Arc<MemoryPushProvider>,
}

impl Harness {
    fn new() -> Self {
        Self::with_provider(MemoryPushProvider::new("tok"))
    }

    fn with_provider(provider: MemoryPushProvider) -> Self {
        Self {
            documents: Arc::new(MemoryDocumentStore::new()),
            realtime: Arc::new(MemoryRealtimeStore::new()),
            cache: Arc::new(MemoryCache::new()),
            provider: Arc::new(provider),
        }
    }

    fn coordinator(&self) -> SyncCoordinator {
        let services = SyncServices {
            documents: self.documents.clone(),
            realtime: self.realtime.clone(),
            cache: self.cache.clone(),
            push_provider: self.provider.clone(),
        };
        SyncCoordinator::new(services, &LocusConfig::default())
    }

    fn presence_state(&self, user: &str) -> Option<serde_json::Value> {
        self.realtime
            .value(&format!("status/{user}"))
            .map(|record| record["state"].clone())
    }
}

fn alice() -> UserId {
    UserId::new("alice")
}

async fn settled(coordinator: &SyncCoordinator) {
    coordinator.presence().wait_idle().await;
    coordinator.settings().wait_idle().await;
}

#[tokio::test]
async fn initialize_runs_all_three_legs() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();

    let report = coordinator.initialize(&alice()).await;
    settled(&coordinator).await;

    assert!(report.is_complete());
    let record = report.push.unwrap();
    assert_eq!(record.push_token, "tok");
    assert_eq!(report.settings.unwrap(), NotificationSettings::default());
    assert_eq!(harness.presence_state("alice"), Some("online".into()));
    assert!(coordinator.presence().is_online());
    assert!(harness
        .documents
        .document("notificationSettings", "alice")
        .is_some());
    assert_eq!(coordinator.current_user(), Some(alice()));
}

#[tokio::test]
async fn denied_permission_does_not_block_other_legs() {
    let harness =
        Harness::with_provider(MemoryPushProvider::new("tok").answering(PermissionStatus::Denied));
    let coordinator = harness.coordinator();
    let mut rx = coordinator.events().subscribe();

    let report = coordinator.initialize(&alice()).await;
    settled(&coordinator).await;

    assert_eq!(
        report.push.as_ref().unwrap_err(),
        &SyncError::PermissionDenied {
            open_settings: false
        }
    );
    assert!(report.settings.is_ok());
    assert!(report.presence_tracking);
    assert!(!report.is_complete());
    assert_eq!(harness.presence_state("alice"), Some("online".into()));

    let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert!(events.contains(&SyncEvent::PermissionDenied {
        open_settings: false
    }));
}

#[tokio::test]
async fn earlier_denial_reports_settings_detour() {
    let harness =
        Harness::with_provider(MemoryPushProvider::new("tok").with_status(PermissionStatus::Denied));
    let coordinator = harness.coordinator();
    let mut rx = coordinator.events().subscribe();

    let report = coordinator.initialize(&alice()).await;
    settled(&coordinator).await;

    assert_eq!(
        report.push.as_ref().unwrap_err(),
        &SyncError::PermissionDenied { open_settings: true }
    );
    assert_eq!(harness.provider.prompts(), 0);
    assert!(report.settings.is_ok());
    assert!(report.presence_tracking);

    let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert!(events.contains(&SyncEvent::PermissionDenied { open_settings: true }));
}

#[tokio::test]
async fn unsupported_push_still_loads_settings_and_presence() {
    let harness = Harness::with_provider(MemoryPushProvider::new("tok").unsupported());
    let coordinator = harness.coordinator();

    let report = coordinator.initialize(&alice()).await;
    settled(&coordinator).await;

    assert!(matches!(report.push, Err(SyncError::TokenUnavailable(_))));
    assert!(report.settings.is_ok());
    assert!(report.presence_tracking);
}

#[tokio::test]
async fn realtime_outage_does_not_fail_initialize() {
    let harness = Harness::new();
    harness
        .realtime
        .fail_next(RemoteError::Unauthorized("rules".into()));
    let coordinator = harness.coordinator();

    let report = coordinator.initialize(&alice()).await;
    settled(&coordinator).await;

    assert!(report.push.is_ok());
    assert!(report.settings.is_ok());
    assert!(report.presence_tracking);
    assert!(!coordinator.presence().is_online());
}

#[tokio::test(start_paused = true)]
async fn legs_run_concurrently() {
    let harness = Harness::new();
    harness.documents.set_latency(Duration::from_secs(1));
    harness.realtime.set_latency(Duration::from_secs(1));
    let coordinator = harness.coordinator();

    let started = tokio::time::Instant::now();
    let report = coordinator.initialize(&alice()).await;
    let elapsed = started.elapsed();

    assert!(report.push.is_ok());
    // Device registration alone takes three round trips.
    assert!(elapsed >= Duration::from_secs(3));
    assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
}

#[tokio::test]
async fn teardown_goes_offline_but_keeps_device() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();
    let report = coordinator.initialize(&alice()).await;
    settled(&coordinator).await;
    let device_id = report.push.unwrap().device_id;

    coordinator.teardown().await;

    assert_eq!(harness.presence_state("alice"), Some("offline".into()));
    assert!(harness.realtime.armed("status/alice").is_none());
    let devices = harness.documents.document("users", "alice").unwrap()["devices"].clone();
    assert!(devices.get(device_id.as_str()).is_some());
    assert_eq!(coordinator.current_user(), None);

    // Settings changes after sign-out no longer reach the remote document.
    let writes = harness.documents.writes().len();
    coordinator
        .settings()
        .set_preference(SettingKey::Messages, false)
        .await
        .unwrap();
    coordinator.settings().wait_idle().await;
    assert_eq!(harness.documents.writes().len(), writes);
}

#[tokio::test]
async fn explicit_deregistration_removes_device() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();

    assert!(matches!(
        coordinator.deregister_device().await,
        Err(SyncError::SessionInvalid(_))
    ));

    let report = coordinator.initialize(&alice()).await;
    let device_id = report.push.unwrap().device_id;
    coordinator.deregister_device().await.unwrap();

    let devices = harness.documents.document("users", "alice").unwrap()["devices"].clone();
    assert!(devices.get(device_id.as_str()).is_none());
}

#[tokio::test(start_paused = true)]
async fn connectivity_changes_reach_presence() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();
    coordinator.initialize(&alice()).await;
    settled(&coordinator).await;

    coordinator.connectivity().report_foreground(false);
    tokio::time::sleep(Duration::from_secs(1)).await;
    coordinator.presence().wait_idle().await;
    assert_eq!(harness.presence_state("alice"), Some("offline".into()));

    coordinator.connectivity().report_foreground(true);
    tokio::time::sleep(Duration::from_secs(1)).await;
    coordinator.presence().wait_idle().await;
    assert_eq!(harness.presence_state("alice"), Some("online".into()));
}

#[tokio::test]
async fn reinitialize_same_user_is_idempotent_for_presence() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();

    coordinator.initialize(&alice()).await;
    coordinator.initialize(&alice()).await;
    settled(&coordinator).await;

    let online_writes = harness
        .realtime
        .log()
        .into_iter()
        .filter(|op| matches!(op, crate::backend::memory::RealtimeOp::Set { value, .. } if value["state"] == "online"))
        .count();
    assert_eq!(online_writes, 1);
}
