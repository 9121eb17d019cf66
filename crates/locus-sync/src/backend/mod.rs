//! Collaborator seams: remote stores, local cache, and the OS push provider.
//!
//! The sync components only ever talk to these traits. `memory` provides
//! in-process implementations (used by tests and the simulator binary) and
//! `file_cache` a JSON-file backed [`KeyValueCache`].

mod file_cache;
mod helpers;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use locus_common::RemoteError;

use crate::model::Platform;

pub use file_cache::FileCache;
pub(crate) use helpers::with_timeout;
pub use helpers::{lookup_path, merge_json, server_timestamp, SERVER_TIMESTAMP_KEY};

/// A single-field change applied by [`DocumentStore::update_field`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(Value),
    Delete,
}

/// Remote document store holding the device map and notification settings.
///
/// Field paths are dot-separated (`devices.<deviceId>`).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, RemoteError>;

    /// Deep-merge `data` into the document, creating it when absent.
    /// Keys not present in `data` are left untouched.
    async fn set_merge(&self, collection: &str, id: &str, data: Value) -> Result<(), RemoteError>;

    /// Change one field of an existing document.
    async fn update_field(
        &self,
        collection: &str,
        id: &str,
        field_path: &str,
        update: FieldUpdate,
    ) -> Result<(), RemoteError>;

    /// Documents whose value at `field_path` equals `value`, as `(id, document)`.
    async fn query_eq(
        &self,
        collection: &str,
        field_path: &str,
        value: &Value,
    ) -> Result<Vec<(String, Value)>, RemoteError>;
}

/// Path-addressed realtime store holding presence records.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    async fn set(&self, path: &str, value: Value) -> Result<(), RemoteError>;

    /// Arm a write the store performs itself when this client's connection
    /// drops. Replaces any write already armed for `path`.
    async fn on_disconnect_set(&self, path: &str, value: Value) -> Result<(), RemoteError>;

    /// Disarm the write armed for `path`, if any.
    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), RemoteError>;
}

/// Local persistent string key-value cache.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RemoteError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), RemoteError>;
    async fn remove(&self, key: &str) -> Result<(), RemoteError>;
}

/// OS-level notification permission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    /// The user has never been prompted.
    Undetermined,
    Granted,
    Denied,
}

/// OS permission prompt and push-token source.
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// `false` on simulators and other environments without a push service.
    fn supports_push(&self) -> bool;

    fn platform(&self) -> Platform;

    fn device_name(&self) -> String;

    /// Current permission without prompting.
    async fn permission_status(&self) -> PermissionStatus;

    /// Show the OS prompt and return the user's answer.
    async fn request_permission(&self) -> PermissionStatus;

    async fn get_token(&self) -> Result<String, RemoteError>;
}
