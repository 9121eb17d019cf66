//! Session-level entry point for UI collaborators.

mod sync_coordinator;

pub use sync_coordinator::{InitReport, SyncCoordinator, SyncServices};

#[cfg(test)]
mod tests;
