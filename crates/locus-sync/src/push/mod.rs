//! Notification permission, push tokens and the per-user device map.

mod manager;

pub use manager::{PermissionOutcome, PushTokenManager};
