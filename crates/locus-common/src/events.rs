use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Diagnostics and state-change notifications emitted by the sync subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SyncEvent {
    PresenceChanged { user_id: String, online: bool },
    SettingsChanged { key: String, enabled: bool },
    SettingsReconciled { source: String },
    DeviceRegistered { user_id: String, device_id: String },
    DeviceDeregistered { user_id: String, device_id: String },
    PermissionDenied { open_settings: bool },
    RemoteWriteFailed { operation: String, reason: String },
    SessionInvalid { operation: String },
    #[serde(other)]
    Unknown,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: SyncEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
