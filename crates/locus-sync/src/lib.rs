//! Presence and notification-state synchronization.
//!
//! Keeps a user's presence record, push device registrations, and
//! notification preferences consistent across the local cache, the
//! in-memory reactive container, and the authoritative remote stores.
//! UI code talks to [`SyncCoordinator`]; the remote stores, the local
//! cache, and the OS push provider are reached through the traits in
//! [`backend`].

pub mod backend;
pub mod connectivity;
pub mod coordinator;
pub mod model;
pub mod presence;
pub mod push;
pub mod settings;

pub use backend::{DocumentStore, KeyValueCache, PermissionStatus, PushProvider, RealtimeStore};
pub use connectivity::{ConnectivityEvent, ConnectivityMonitor, ConnectivityState, SubscriptionToken};
pub use coordinator::{InitReport, SyncCoordinator, SyncServices};
pub use model::{
    DeviceRecord, NotificationSettings, Platform, PresenceRecord, PresenceState, SettingKey,
};
pub use presence::PresenceTracker;
pub use push::{PermissionOutcome, PushTokenManager};
pub use settings::NotificationSettingsStore;
