//! The signed-in user's presence record in the realtime store.
//!
//! One worker task per tracking session (connection epoch) performs every
//! write, so at most one write per user is ever in flight. Online writes
//! are always preceded by arming the disconnect fallback; explicit Offline
//! writes are always preceded by cancelling it.

mod tracker;
mod worker;

pub use tracker::PresenceTracker;

#[cfg(test)]
mod tests;
