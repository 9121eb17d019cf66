use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use locus_common::{EventBus, SyncError, SyncEvent, UserId};
use locus_config::LocusConfig;

use crate::backend::{DocumentStore, KeyValueCache, PushProvider, RealtimeStore};
use crate::connectivity::ConnectivityMonitor;
use crate::model::{DeviceRecord, NotificationSettings};
use crate::presence::PresenceTracker;
use crate::push::PushTokenManager;
use crate::settings::NotificationSettingsStore;

/// External collaborators the sync components run against.
#[derive(Clone)]
pub struct SyncServices {
    pub documents: Arc<dyn DocumentStore>,
    pub realtime: Arc<dyn RealtimeStore>,
    pub cache: Arc<dyn KeyValueCache>,
    pub push_provider: Arc<dyn PushProvider>,
}

/// Outcome of each leg of [`SyncCoordinator::initialize`].
///
/// A declined notification prompt shows up as
/// `push: Err(SyncError::PermissionDenied { open_settings })`; when
/// `open_settings` is set the OS will not prompt again and the UI should
/// offer the detour to the system settings instead.
#[derive(Debug)]
pub struct InitReport {
    pub push: Result<DeviceRecord, SyncError>,
    pub settings: Result<NotificationSettings, SyncError>,
    /// Whether presence is being tracked for the user.
    pub presence_tracking: bool,
}

impl InitReport {
    pub fn is_complete(&self) -> bool {
        self.push.is_ok() && self.settings.is_ok() && self.presence_tracking
    }
}

/// Sequences session start and end across the sync components.
///
/// Must be constructed inside a tokio runtime: the connectivity monitor
/// spawns its debounce task immediately.
pub struct SyncCoordinator {
    events: EventBus,
    connectivity: ConnectivityMonitor,
    presence: Arc<PresenceTracker>,
    push: PushTokenManager,
    settings: NotificationSettingsStore,
    user: Mutex<Option<UserId>>,
}

impl SyncCoordinator {
    pub fn new(services: SyncServices, config: &LocusConfig) -> Self {
        let events = EventBus::default();

        let connectivity = ConnectivityMonitor::spawn(&config.connectivity);
        let presence = Arc::new(PresenceTracker::new(
            services.realtime,
            config.presence.clone(),
            events.clone(),
        ));
        let subscriber = presence.clone();
        connectivity.subscribe(move |event| subscriber.on_connectivity_change(event));

        let push = PushTokenManager::new(
            services.documents.clone(),
            services.cache.clone(),
            services.push_provider,
            config.push.clone(),
            events.clone(),
        );
        let settings = NotificationSettingsStore::new(
            services.documents,
            services.cache,
            config.settings.clone(),
            events.clone(),
        );

        Self {
            events,
            connectivity,
            presence,
            push,
            settings,
            user: Mutex::new(None),
        }
    }

    fn user_slot(&self) -> MutexGuard<'_, Option<UserId>> {
        self.user.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a session for `user`.
    ///
    /// Device registration, settings reconciliation and presence tracking
    /// run concurrently; a failing leg never blocks or fails the others.
    pub async fn initialize(&self, user: &UserId) -> InitReport {
        *self.user_slot() = Some(user.clone());
        info!(user_id = %user, "Initializing sync session");

        let (push, settings, ()) = tokio::join!(
            self.push.register_current_device(user),
            self.settings.load(Some(user)),
            self.presence.start(user),
        );

        match &push {
            Ok(record) => info!(user_id = %user, device_id = %record.device_id, "Push registration ready"),
            Err(SyncError::PermissionDenied { open_settings }) => {
                info!(user_id = %user, open_settings, "Push registration skipped, permission denied");
                self.events.publish(SyncEvent::PermissionDenied {
                    open_settings: *open_settings,
                });
            }
            Err(e) => warn!(user_id = %user, error = %e, "Push registration failed"),
        }
        if let Err(e) = &settings {
            warn!(user_id = %user, error = %e, "Settings reconciliation incomplete");
        }

        let presence_tracking = self.presence.tracked_user().as_ref() == Some(user);
        InitReport {
            push,
            settings,
            presence_tracking,
        }
    }

    /// End the session: presence goes Offline and the settings store lets
    /// go of the user. The device stays registered.
    pub async fn teardown(&self) {
        let user = self.user_slot().take();
        self.presence.stop().await;
        self.settings.detach().await;
        match user {
            Some(user) => info!(user_id = %user, "Sync session ended"),
            None => info!("Sync teardown with no session"),
        }
    }

    /// Remove this installation from the signed-in user's device map.
    pub async fn deregister_device(&self) -> Result<(), SyncError> {
        let user = self
            .current_user()
            .ok_or_else(|| SyncError::SessionInvalid("no signed-in user".into()))?;
        let device_id = self.push.device_id().await;
        self.push.deregister_device(&user, &device_id).await;
        Ok(())
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.user_slot().clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn push(&self) -> &PushTokenManager {
        &self.push
    }

    pub fn settings(&self) -> &NotificationSettingsStore {
        &self.settings
    }
}
