//! Helpers shared by the collaborator implementations and their callers.

use std::future::Future;
use std::time::Duration;

use serde_json::{Map, Value};

use locus_common::RemoteError;

/// Key of the server-timestamp placeholder object (`{".sv": "timestamp"}`).
pub const SERVER_TIMESTAMP_KEY: &str = ".sv";

/// Placeholder the realtime store replaces with its own clock when the
/// write is applied.
pub fn server_timestamp() -> Value {
    let mut placeholder = Map::new();
    placeholder.insert(SERVER_TIMESTAMP_KEY.into(), Value::String("timestamp".into()));
    Value::Object(placeholder)
}

/// Replace every server-timestamp placeholder in `value` with `now_ms`.
pub(crate) fn resolve_server_timestamps(value: &mut Value, now_ms: i64) {
    match value {
        Value::Object(map) => {
            if map.len() == 1
                && map.get(SERVER_TIMESTAMP_KEY).and_then(Value::as_str) == Some("timestamp")
            {
                *value = Value::from(now_ms);
                return;
            }
            for child in map.values_mut() {
                resolve_server_timestamps(child, now_ms);
            }
        }
        Value::Array(items) => {
            for item in items {
                resolve_server_timestamps(item, now_ms);
            }
        }
        _ => {}
    }
}

/// Deep-merge `patch` into `target`. Objects merge key by key; any other
/// value replaces what was there.
pub fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Value at a dot-separated path, if every segment exists.
pub fn lookup_path<'a>(value: &'a Value, field_path: &str) -> Option<&'a Value> {
    field_path
        .split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

/// Bound a collaborator call, mapping an elapsed deadline to
/// [`RemoteError::Timeout`].
pub(crate) async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_elapsed) => Err(RemoteError::Timeout(limit.as_millis() as u64)),
    }
}
