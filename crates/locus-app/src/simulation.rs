//! Scripted session against the in-memory remote stores.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{info, warn};

use locus_common::{SyncEvent, UserId};
use locus_config::LocusConfig;
use locus_sync::backend::memory::{MemoryDocumentStore, MemoryRealtimeStore};
use locus_sync::{SettingKey, SyncCoordinator};

pub struct Simulation {
    pub coordinator: SyncCoordinator,
    pub documents: Arc<MemoryDocumentStore>,
    pub realtime: Arc<MemoryRealtimeStore>,
    pub config: LocusConfig,
}

impl Simulation {
    /// Run the whole script and return a JSON summary of the final state.
    pub async fn run(&self, user: &UserId, crash: bool) -> Value {
        let mut events = self.coordinator.events().subscribe();

        let report = self.coordinator.initialize(user).await;
        info!(
            complete = report.is_complete(),
            presence = report.presence_tracking,
            "Session initialized"
        );
        if let Err(e) = &report.push {
            warn!(error = %e, "Push registration unavailable");
        }
        if let Err(e) = &report.settings {
            warn!(error = %e, "Settings not reconciled with remote");
        }

        self.flap_reachability().await;
        self.background_round_trip().await;
        let checks = self.toggle_settings().await;

        self.coordinator.presence().wait_idle().await;
        self.coordinator.settings().wait_idle().await;
        let online_before_exit = self.coordinator.presence().is_online();

        if crash {
            let fired = self.realtime.simulate_disconnect();
            info!(fired, "Connection dropped without sign-out");
        } else {
            self.coordinator.teardown().await;
        }

        let events: Vec<SyncEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        let status_path = format!("{}/{}", self.config.presence.status_path, user);

        json!({
            "user": user,
            "deviceId": self.coordinator.push().device_id().await,
            "onlineBeforeExit": online_before_exit,
            "presence": self.realtime.value(&status_path),
            "devices": self
                .documents
                .document(&self.config.push.users_collection, user.as_str())
                .and_then(|doc| doc.get("devices").cloned()),
            "settings": self.coordinator.settings().get_snapshot(),
            "remoteSettings": self
                .documents
                .document(&self.config.settings.collection, user.as_str()),
            "settingChecks": checks,
            "events": events,
        })
    }

    fn settle_window(&self) -> Duration {
        let connectivity = &self.config.connectivity;
        connectivity
            .reachability_debounce()
            .max(connectivity.lifecycle_debounce())
            + Duration::from_millis(250)
    }

    /// Rapid network loss and recovery that settles back on connected.
    async fn flap_reachability(&self) {
        let monitor = self.coordinator.connectivity();
        for _ in 0..5 {
            monitor.report_reachability(false);
            tokio::time::sleep(Duration::from_millis(100)).await;
            monitor.report_reachability(true);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(self.settle_window()).await;
        self.coordinator.presence().wait_idle().await;
        info!(online = self.coordinator.presence().is_online(), "Reachability flapping settled");
    }

    async fn background_round_trip(&self) {
        let monitor = self.coordinator.connectivity();

        monitor.report_foreground(false);
        tokio::time::sleep(self.settle_window()).await;
        self.coordinator.presence().wait_idle().await;
        info!(online = self.coordinator.presence().is_online(), "App backgrounded");

        monitor.report_foreground(true);
        tokio::time::sleep(self.settle_window()).await;
        self.coordinator.presence().wait_idle().await;
        info!(online = self.coordinator.presence().is_online(), "App foregrounded");
    }

    /// Walk the cascade: switch everything off, try to re-enable one
    /// dependent (rejected), then turn things back on in order.
    async fn toggle_settings(&self) -> Vec<Value> {
        let steps = [
            (SettingKey::AllNotifications, false),
            (SettingKey::Messages, true),
            (SettingKey::AllNotifications, true),
            (SettingKey::Messages, true),
            (SettingKey::EmailNotifications, true),
        ];

        let mut checks = Vec::with_capacity(steps.len());
        for (key, value) in steps {
            let result = self.coordinator.settings().set_preference(key, value).await;
            let outcome = match &result {
                Ok(_) => "ok".to_string(),
                Err(e) => e.to_string(),
            };
            info!(%key, value, outcome = %outcome, "Settings change");
            checks.push(json!({
                "key": key.to_string(),
                "value": value,
                "outcome": outcome,
            }));
        }
        checks
    }
}
