//! Notification preference flags and their reconciliation across the
//! reactive container, the local cache, and the remote settings document.

mod store;
mod writer;

pub use store::NotificationSettingsStore;
