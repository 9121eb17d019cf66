use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use locus_common::{DeviceId, EventBus, RemoteError, SyncError, SyncEvent, UserId};
use locus_config::PushConfig;

use crate::backend::{
    with_timeout, DocumentStore, FieldUpdate, KeyValueCache, PermissionStatus, PushProvider,
};
use crate::model::DeviceRecord;

const DEVICE_ID_KEY: &str = "device_id";
const PUSH_TOKEN_KEY: &str = "push_token";

/// Result of asking for notification permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    /// The user just declined the OS prompt.
    Denied,
    /// Permission was declined earlier. The OS will not prompt again, so
    /// the caller should offer a detour to the system settings.
    OpenSettings,
}

impl PermissionOutcome {
    pub fn is_granted(self) -> bool {
        self == PermissionOutcome::Granted
    }
}

/// Requests permission, obtains the push token, and keeps this
/// installation's entry in the user's device map.
pub struct PushTokenManager {
    documents: Arc<dyn DocumentStore>,
    cache: Arc<dyn KeyValueCache>,
    provider: Arc<dyn PushProvider>,
    config: PushConfig,
    events: EventBus,
    device_id: Mutex<Option<DeviceId>>,
}

impl PushTokenManager {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        cache: Arc<dyn KeyValueCache>,
        provider: Arc<dyn PushProvider>,
        config: PushConfig,
        events: EventBus,
    ) -> Self {
        Self {
            documents,
            cache,
            provider,
            config,
            events,
            device_id: Mutex::new(None),
        }
    }

    /// Ask for notification permission. Never re-prompts after a denial.
    pub async fn request_permission(&self) -> PermissionOutcome {
        match self.provider.permission_status().await {
            PermissionStatus::Granted => PermissionOutcome::Granted,
            PermissionStatus::Denied => {
                debug!("Notification permission previously denied");
                PermissionOutcome::OpenSettings
            }
            PermissionStatus::Undetermined => match self.provider.request_permission().await {
                PermissionStatus::Granted => {
                    info!("Notification permission granted");
                    PermissionOutcome::Granted
                }
                _ => {
                    info!("Notification permission denied");
                    PermissionOutcome::Denied
                }
            },
        }
    }

    /// Fetch the push token from the OS push service and mirror it locally.
    ///
    /// Requires permission to have been granted.
    pub async fn obtain_token(&self) -> Result<String, SyncError> {
        if !self.provider.supports_push() {
            return Err(SyncError::TokenUnavailable(
                "push is not supported on this device".into(),
            ));
        }
        match self.provider.permission_status().await {
            PermissionStatus::Granted => {}
            status => {
                return Err(SyncError::PermissionDenied {
                    open_settings: status == PermissionStatus::Denied,
                })
            }
        }

        let token = with_timeout(self.config.token_timeout(), self.provider.get_token())
            .await
            .map_err(|e| SyncError::TokenUnavailable(e.to_string()))?;
        if token.is_empty() {
            return Err(SyncError::TokenUnavailable(
                "push service returned an empty token".into(),
            ));
        }

        if let Err(e) = self.cache.set(PUSH_TOKEN_KEY, &token).await {
            warn!(error = %e, "Failed to cache push token");
        }
        Ok(token)
    }

    /// Last token mirrored into the local cache.
    pub async fn cached_token(&self) -> Option<String> {
        self.cache.get(PUSH_TOKEN_KEY).await.ok().flatten()
    }

    /// This installation's id: read from the local cache, or generated and
    /// cached on first use.
    pub async fn device_id(&self) -> DeviceId {
        let mut slot = self.device_id.lock().await;
        if let Some(id) = slot.as_ref() {
            return id.clone();
        }

        let cached = match self.cache.get(DEVICE_ID_KEY).await {
            Ok(cached) => cached.filter(|id| !id.is_empty()),
            Err(e) => {
                warn!(error = %e, "Device id cache unreadable");
                None
            }
        };
        let id = match cached {
            Some(id) => DeviceId::new(id),
            None => {
                let id = DeviceId::generate();
                info!(device_id = %id, "Generated device id");
                if let Err(e) = self.cache.set(DEVICE_ID_KEY, id.as_str()).await {
                    warn!(error = %e, "Failed to cache device id");
                }
                id
            }
        };

        *slot = Some(id.clone());
        id
    }

    /// Upsert one entry of the user's device map.
    ///
    /// Other entries are untouched. An existing entry for the same device
    /// keeps its `registeredAt`.
    pub async fn register_device(
        &self,
        user: &UserId,
        device_id: &DeviceId,
        token: &str,
    ) -> Result<DeviceRecord, SyncError> {
        let collection = &self.config.users_collection;
        let limit = self.config.write_timeout();
        let now = Utc::now();

        let existing = with_timeout(
            self.config.read_timeout(),
            self.documents.get(collection, user.as_str()),
        )
        .await;
        let registered_at = match existing {
            Ok(doc) => doc.and_then(|doc| registered_at(&doc, device_id)),
            Err(e) if e.is_unauthorized() => return Err(e.into()),
            Err(e) => {
                debug!(user_id = %user, error = %e, "Device map unreadable, registering fresh");
                None
            }
        };

        let record = DeviceRecord {
            device_id: device_id.clone(),
            push_token: token.to_string(),
            platform: self.provider.platform(),
            device_name: self.provider.device_name(),
            registered_at: registered_at.unwrap_or(now),
            last_updated: now,
        };

        let mut devices = Map::new();
        devices.insert(
            device_id.to_string(),
            serde_json::to_value(&record).map_err(RemoteError::from)?,
        );
        let mut patch = Map::new();
        patch.insert("devices".into(), Value::Object(devices));

        if let Err(e) = with_timeout(
            limit,
            self.documents
                .set_merge(collection, user.as_str(), Value::Object(patch)),
        )
        .await
        {
            warn!(user_id = %user, device_id = %device_id, error = %e, "Device registration failed");
            return Err(e.into());
        }

        info!(user_id = %user, device_id = %device_id, "Device registered");
        self.events.publish(SyncEvent::DeviceRegistered {
            user_id: user.to_string(),
            device_id: device_id.to_string(),
        });

        self.release_from_other_users(user, device_id).await;
        Ok(record)
    }

    /// Remove entries for `device_id` held by any user other than `user`,
    /// so a shared installation only notifies whoever signed in last.
    async fn release_from_other_users(&self, user: &UserId, device_id: &DeviceId) {
        let collection = &self.config.users_collection;
        let limit = self.config.write_timeout();
        let field = format!("devices.{device_id}.deviceId");
        let needle = Value::String(device_id.to_string());

        let holders = match with_timeout(
            self.config.read_timeout(),
            self.documents.query_eq(collection, &field, &needle),
        )
        .await
        {
            Ok(holders) => holders,
            Err(e) => {
                debug!(device_id = %device_id, error = %e, "Skipping device hand-off");
                return;
            }
        };

        let entry = format!("devices.{device_id}");
        for (holder, _) in holders.into_iter().filter(|(id, _)| id != user.as_str()) {
            match with_timeout(
                limit,
                self.documents
                    .update_field(collection, &holder, &entry, FieldUpdate::Delete),
            )
            .await
            {
                Ok(()) => {
                    info!(previous_user = %holder, device_id = %device_id, "Released device from previous user")
                }
                Err(e) => {
                    warn!(previous_user = %holder, device_id = %device_id, error = %e, "Failed to release device")
                }
            }
        }
    }

    /// Remove this device's entry from the user's device map.
    ///
    /// Best-effort: failures are logged and never returned.
    pub async fn deregister_device(&self, user: &UserId, device_id: &DeviceId) {
        let entry = format!("devices.{device_id}");
        let result = with_timeout(
            self.config.write_timeout(),
            self.documents.update_field(
                &self.config.users_collection,
                user.as_str(),
                &entry,
                FieldUpdate::Delete,
            ),
        )
        .await;

        match result {
            Ok(()) => {
                info!(user_id = %user, device_id = %device_id, "Device deregistered");
                self.events.publish(SyncEvent::DeviceDeregistered {
                    user_id: user.to_string(),
                    device_id: device_id.to_string(),
                });
            }
            Err(e) => {
                warn!(user_id = %user, device_id = %device_id, error = %e, "Device deregistration failed");
            }
        }
    }

    /// Permission, token, then registration of this installation.
    pub async fn register_current_device(&self, user: &UserId) -> Result<DeviceRecord, SyncError> {
        if !self.config.enabled {
            return Err(SyncError::TokenUnavailable(
                "push registration disabled by config".into(),
            ));
        }
        if !self.provider.supports_push() {
            return Err(SyncError::TokenUnavailable(
                "push is not supported on this device".into(),
            ));
        }
        match self.request_permission().await {
            PermissionOutcome::Granted => {}
            outcome => {
                return Err(SyncError::PermissionDenied {
                    open_settings: outcome == PermissionOutcome::OpenSettings,
                })
            }
        }

        let token = self.obtain_token().await?;
        let device_id = self.device_id().await;
        self.register_device(user, &device_id, &token).await
    }

    /// Handle an OS-initiated token rotation for this installation.
    pub async fn refresh_token(&self, user: &UserId, token: &str) -> Result<DeviceRecord, SyncError> {
        if let Err(e) = self.cache.set(PUSH_TOKEN_KEY, token).await {
            warn!(error = %e, "Failed to cache push token");
        }
        let device_id = self.device_id().await;
        debug!(user_id = %user, device_id = %device_id, "Push token rotated");
        self.register_device(user, &device_id, token).await
    }

    /// Every entry of the user's device map. Malformed entries are skipped.
    pub async fn list_devices(&self, user: &UserId) -> Result<Vec<DeviceRecord>, SyncError> {
        let doc = with_timeout(
            self.config.read_timeout(),
            self.documents.get(&self.config.users_collection, user.as_str()),
        )
        .await?;

        let Some(devices) = doc
            .as_ref()
            .and_then(|doc| doc.get("devices"))
            .and_then(Value::as_object)
        else {
            return Ok(Vec::new());
        };

        Ok(devices
            .iter()
            .filter_map(|(id, entry)| match serde_json::from_value(entry.clone()) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(user_id = %user, device_id = %id, error = %e, "Skipping malformed device entry");
                    None
                }
            })
            .collect())
    }
}

fn registered_at(doc: &Value, device_id: &DeviceId) -> Option<DateTime<Utc>> {
    let value = doc.get("devices")?.get(device_id.as_str())?.get("registeredAt")?;
    serde_json::from_value(value.clone()).ok()
}
