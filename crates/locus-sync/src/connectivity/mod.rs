//! Debounced network reachability and app lifecycle signals.
//!
//! Platform glue pushes raw OS signals in through
//! [`ConnectivityMonitor::report_reachability`] and
//! [`ConnectivityMonitor::report_foreground`]; subscribers only see settled
//! changes.

mod monitor;
mod types;

pub use monitor::ConnectivityMonitor;
pub use types::{ConnectivityEvent, ConnectivityState, SubscriptionToken};

#[cfg(test)]
mod tests;
