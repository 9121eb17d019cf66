//! In-process collaborators.
//!
//! Each store keeps an operation log for ordering assertions and supports
//! fault injection (`fail_next`) and artificial latency (`set_latency`).
//! The simulator binary runs a whole session against these.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};

use locus_common::RemoteError;

use super::helpers::{lookup_path, merge_json, resolve_server_timestamps};
use super::{DocumentStore, FieldUpdate, KeyValueCache, PermissionStatus, PushProvider, RealtimeStore};
use crate::model::Platform;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct Faults {
    failures: VecDeque<RemoteError>,
    latency: Duration,
    failed_ops: usize,
}

impl Faults {
    fn take_failure(&mut self) -> Option<RemoteError> {
        let failure = self.failures.pop_front();
        if failure.is_some() {
            self.failed_ops += 1;
        }
        failure
    }
}

async fn simulate_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

// ---------------------------------------------------------------------------
// Document store
// ---------------------------------------------------------------------------

/// An applied document-store operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOp {
    Get {
        collection: String,
        id: String,
    },
    SetMerge {
        collection: String,
        id: String,
        data: Value,
    },
    UpdateField {
        collection: String,
        id: String,
        field_path: String,
        update: FieldUpdate,
    },
    Query {
        collection: String,
        field_path: String,
    },
}

impl DocumentOp {
    pub fn is_write(&self) -> bool {
        matches!(self, DocumentOp::SetMerge { .. } | DocumentOp::UpdateField { .. })
    }
}

#[derive(Default)]
struct DocumentState {
    docs: BTreeMap<(String, String), Value>,
    log: Vec<DocumentOp>,
    faults: Faults,
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    state: Mutex<DocumentState>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without logging an operation.
    pub fn insert(&self, collection: &str, id: &str, value: Value) {
        lock(&self.state)
            .docs
            .insert((collection.to_string(), id.to_string()), value);
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<Value> {
        lock(&self.state)
            .docs
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
    }

    pub fn log(&self) -> Vec<DocumentOp> {
        lock(&self.state).log.clone()
    }

    pub fn writes(&self) -> Vec<DocumentOp> {
        lock(&self.state)
            .log
            .iter()
            .filter(|op| op.is_write())
            .cloned()
            .collect()
    }

    pub fn failed_ops(&self) -> usize {
        lock(&self.state).faults.failed_ops
    }

    /// Make the next operation fail with `err`. Calls queue up.
    pub fn fail_next(&self, err: RemoteError) {
        lock(&self.state).faults.failures.push_back(err);
    }

    pub fn set_latency(&self, latency: Duration) {
        lock(&self.state).faults.latency = latency;
    }

    async fn begin(&self) -> Result<MutexGuard<'_, DocumentState>, RemoteError> {
        let latency = lock(&self.state).faults.latency;
        simulate_latency(latency).await;
        let mut state = lock(&self.state);
        match state.faults.take_failure() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

fn apply_field_update(doc: &mut Value, field_path: &str, update: FieldUpdate) {
    let mut parents: Vec<&str> = field_path.split('.').collect();
    let Some(leaf) = parents.pop() else {
        return;
    };

    match update {
        FieldUpdate::Set(value) => {
            let mut current = doc;
            for segment in parents {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                let Value::Object(map) = current else {
                    return;
                };
                current = map
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            if let Value::Object(map) = current {
                map.insert(leaf.to_string(), value);
            }
        }
        FieldUpdate::Delete => {
            let parent = parents
                .into_iter()
                .try_fold(doc, |current, segment| current.get_mut(segment));
            if let Some(Value::Object(map)) = parent {
                map.remove(leaf);
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, RemoteError> {
        let mut state = self.begin().await?;
        state.log.push(DocumentOp::Get {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        Ok(state
            .docs
            .get(&(collection.to_string(), id.to_string()))
            .cloned())
    }

    async fn set_merge(&self, collection: &str, id: &str, data: Value) -> Result<(), RemoteError> {
        let mut state = self.begin().await?;
        state.log.push(DocumentOp::SetMerge {
            collection: collection.to_string(),
            id: id.to_string(),
            data: data.clone(),
        });
        let doc = state
            .docs
            .entry((collection.to_string(), id.to_string()))
            .or_insert_with(|| Value::Object(Map::new()));
        merge_json(doc, data);
        Ok(())
    }

    async fn update_field(
        &self,
        collection: &str,
        id: &str,
        field_path: &str,
        update: FieldUpdate,
    ) -> Result<(), RemoteError> {
        let mut state = self.begin().await?;
        let key = (collection.to_string(), id.to_string());
        if !state.docs.contains_key(&key) {
            return Err(RemoteError::Unavailable(format!(
                "no document {collection}/{id}"
            )));
        }
        state.log.push(DocumentOp::UpdateField {
            collection: collection.to_string(),
            id: id.to_string(),
            field_path: field_path.to_string(),
            update: update.clone(),
        });
        if let Some(doc) = state.docs.get_mut(&key) {
            apply_field_update(doc, field_path, update);
        }
        Ok(())
    }

    async fn query_eq(
        &self,
        collection: &str,
        field_path: &str,
        value: &Value,
    ) -> Result<Vec<(String, Value)>, RemoteError> {
        let mut state = self.begin().await?;
        state.log.push(DocumentOp::Query {
            collection: collection.to_string(),
            field_path: field_path.to_string(),
        });
        Ok(state
            .docs
            .iter()
            .filter(|((coll, _), doc)| coll == collection && lookup_path(doc, field_path) == Some(value))
            .map(|((_, id), doc)| (id.clone(), doc.clone()))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Realtime store
// ---------------------------------------------------------------------------

/// An applied realtime-store operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeOp {
    Set { path: String, value: Value },
    ArmDisconnect { path: String, value: Value },
    CancelDisconnect { path: String },
    /// The store executed an armed write after the connection dropped.
    FallbackFired { path: String, value: Value },
}

#[derive(Default)]
struct RealtimeState {
    values: BTreeMap<String, Value>,
    armed: BTreeMap<String, Value>,
    log: Vec<RealtimeOp>,
    faults: Faults,
}

#[derive(Default)]
pub struct MemoryRealtimeStore {
    state: Mutex<RealtimeState>,
}

impl MemoryRealtimeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, path: &str) -> Option<Value> {
        lock(&self.state).values.get(path).cloned()
    }

    /// The write currently armed for `path`.
    pub fn armed(&self, path: &str) -> Option<Value> {
        lock(&self.state).armed.get(path).cloned()
    }

    pub fn log(&self) -> Vec<RealtimeOp> {
        lock(&self.state).log.clone()
    }

    pub fn failed_ops(&self) -> usize {
        lock(&self.state).faults.failed_ops
    }

    pub fn fail_next(&self, err: RemoteError) {
        lock(&self.state).faults.failures.push_back(err);
    }

    pub fn set_latency(&self, latency: Duration) {
        lock(&self.state).faults.latency = latency;
    }

    /// Drop the client's connection: every armed write is executed by the
    /// store and disarmed. Returns how many fired.
    pub fn simulate_disconnect(&self) -> usize {
        let mut state = lock(&self.state);
        let armed = std::mem::take(&mut state.armed);
        let now_ms = Utc::now().timestamp_millis();
        let fired = armed.len();
        for (path, mut value) in armed {
            resolve_server_timestamps(&mut value, now_ms);
            state.log.push(RealtimeOp::FallbackFired {
                path: path.clone(),
                value: value.clone(),
            });
            state.values.insert(path, value);
        }
        fired
    }

    async fn begin(&self) -> Result<MutexGuard<'_, RealtimeState>, RemoteError> {
        let latency = lock(&self.state).faults.latency;
        simulate_latency(latency).await;
        let mut state = lock(&self.state);
        match state.faults.take_failure() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl RealtimeStore for MemoryRealtimeStore {
    async fn set(&self, path: &str, mut value: Value) -> Result<(), RemoteError> {
        let mut state = self.begin().await?;
        resolve_server_timestamps(&mut value, Utc::now().timestamp_millis());
        state.log.push(RealtimeOp::Set {
            path: path.to_string(),
            value: value.clone(),
        });
        state.values.insert(path.to_string(), value);
        Ok(())
    }

    async fn on_disconnect_set(&self, path: &str, value: Value) -> Result<(), RemoteError> {
        let mut state = self.begin().await?;
        state.log.push(RealtimeOp::ArmDisconnect {
            path: path.to_string(),
            value: value.clone(),
        });
        state.armed.insert(path.to_string(), value);
        Ok(())
    }

    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), RemoteError> {
        let mut state = self.begin().await?;
        state.log.push(RealtimeOp::CancelDisconnect {
            path: path.to_string(),
        });
        state.armed.remove(path);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Key-value cache
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CacheState {
    entries: BTreeMap<String, String>,
    faults: Faults,
}

#[derive(Default)]
pub struct MemoryCache {
    state: Mutex<CacheState>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, value: &str) {
        lock(&self.state)
            .entries
            .insert(key.to_string(), value.to_string());
    }

    pub fn entry(&self, key: &str) -> Option<String> {
        lock(&self.state).entries.get(key).cloned()
    }

    /// Wipe everything, as a reinstall or "clear app data" would.
    pub fn clear(&self) {
        lock(&self.state).entries.clear();
    }

    pub fn fail_next(&self, err: RemoteError) {
        lock(&self.state).faults.failures.push_back(err);
    }

    fn begin(&self) -> Result<MutexGuard<'_, CacheState>, RemoteError> {
        let mut state = lock(&self.state);
        match state.faults.take_failure() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, RemoteError> {
        Ok(self.begin()?.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RemoteError> {
        self.begin()?
            .entries
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), RemoteError> {
        self.begin()?.entries.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Push provider
// ---------------------------------------------------------------------------

struct PushState {
    status: PermissionStatus,
    answer: PermissionStatus,
    prompts: usize,
    token: Result<String, RemoteError>,
    supports_push: bool,
}

/// Scripted OS permission prompt and token source.
pub struct MemoryPushProvider {
    state: Mutex<PushState>,
    platform: Platform,
    device_name: String,
}

impl MemoryPushProvider {
    /// A supported device that has never prompted and whose user will
    /// grant permission.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(PushState {
                status: PermissionStatus::Undetermined,
                answer: PermissionStatus::Granted,
                prompts: 0,
                token: Ok(token.into()),
                supports_push: true,
            }),
            platform: Platform::Ios,
            device_name: "Simulated Phone".into(),
        }
    }

    pub fn with_status(self, status: PermissionStatus) -> Self {
        lock(&self.state).status = status;
        self
    }

    /// What the user picks when prompted.
    pub fn answering(self, answer: PermissionStatus) -> Self {
        lock(&self.state).answer = answer;
        self
    }

    pub fn unsupported(self) -> Self {
        lock(&self.state).supports_push = false;
        self
    }

    pub fn with_platform(mut self, platform: Platform, device_name: &str) -> Self {
        self.platform = platform;
        self.device_name = device_name.to_string();
        self
    }

    pub fn failing_token(self, err: RemoteError) -> Self {
        lock(&self.state).token = Err(err);
        self
    }

    pub fn rotate_token(&self, token: &str) {
        lock(&self.state).token = Ok(token.to_string());
    }

    /// How many times the OS prompt was shown.
    pub fn prompts(&self) -> usize {
        lock(&self.state).prompts
    }
}

#[async_trait]
impl PushProvider for MemoryPushProvider {
    fn supports_push(&self) -> bool {
        lock(&self.state).supports_push
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn device_name(&self) -> String {
        self.device_name.clone()
    }

    async fn permission_status(&self) -> PermissionStatus {
        lock(&self.state).status
    }

    async fn request_permission(&self) -> PermissionStatus {
        let mut state = lock(&self.state);
        state.prompts += 1;
        state.status = state.answer;
        state.status
    }

    async fn get_token(&self) -> Result<String, RemoteError> {
        lock(&self.state).token.clone()
    }
}
