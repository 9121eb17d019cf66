use std::sync::{Arc, Mutex};
use std::time::Duration;

use locus_config::ConnectivityConfig;

use super::*;

fn config() -> ConnectivityConfig {
    ConnectivityConfig {
        reachability_debounce_ms: 1500,
        lifecycle_debounce_ms: 250,
    }
}

fn recorder(monitor: &ConnectivityMonitor) -> (SubscriptionToken, Arc<Mutex<Vec<ConnectivityEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let token = monitor.subscribe(move |event| sink.lock().unwrap().push(event));
    (token, events)
}

async fn settle() {
    tokio::time::sleep(Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn emits_settled_change() {
    let monitor = ConnectivityMonitor::spawn(&config());
    let (_, events) = recorder(&monitor);

    monitor.report_reachability(false);
    settle().await;

    assert_eq!(*events.lock().unwrap(), vec![ConnectivityEvent::Connected(false)]);
    assert!(!monitor.current().connected);
    assert!(!monitor.current().is_present());
}

#[tokio::test(start_paused = true)]
async fn nothing_emitted_before_window_elapses() {
    let monitor = ConnectivityMonitor::spawn(&config());
    let (_, events) = recorder(&monitor);

    monitor.report_reachability(false);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(events.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn flapping_inside_window_collapses() {
    let monitor = ConnectivityMonitor::spawn(&config());
    let (_, events) = recorder(&monitor);

    for _ in 0..5 {
        monitor.report_reachability(false);
        tokio::time::sleep(Duration::from_millis(200)).await;
        monitor.report_reachability(true);
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    settle().await;

    // Settled back on the launch value: no change to report.
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn duplicate_values_are_suppressed() {
    let monitor = ConnectivityMonitor::spawn(&config());
    let (_, events) = recorder(&monitor);

    monitor.report_foreground(false);
    settle().await;
    monitor.report_foreground(false);
    settle().await;
    monitor.report_foreground(true);
    settle().await;

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            ConnectivityEvent::Foreground(false),
            ConnectivityEvent::Foreground(true),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn kinds_debounce_independently() {
    let monitor = ConnectivityMonitor::spawn(&config());
    let (_, events) = recorder(&monitor);

    monitor.report_reachability(false);
    monitor.report_foreground(false);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(*events.lock().unwrap(), vec![ConnectivityEvent::Foreground(false)]);

    settle().await;
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            ConnectivityEvent::Foreground(false),
            ConnectivityEvent::Connected(false),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_callback_stops_receiving() {
    let monitor = ConnectivityMonitor::spawn(&config());
    let (token, events) = recorder(&monitor);

    assert!(monitor.unsubscribe(token));
    assert!(!monitor.unsubscribe(token));

    monitor.report_reachability(false);
    settle().await;
    assert!(events.lock().unwrap().is_empty());
    assert!(!monitor.current().connected);
}

#[tokio::test(start_paused = true)]
async fn shutdown_drops_unsettled_signals() {
    let monitor = ConnectivityMonitor::spawn(&config());
    let (_, events) = recorder(&monitor);

    monitor.report_reachability(false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    monitor.shutdown();
    settle().await;

    assert!(events.lock().unwrap().is_empty());
    assert_eq!(monitor.current(), ConnectivityState::default());
}

#[test]
fn state_applies_events() {
    let mut state = ConnectivityState::default();
    assert!(state.is_present());

    state.apply(ConnectivityEvent::Foreground(false));
    assert!(state.connected);
    assert!(!state.is_present());

    state.apply(ConnectivityEvent::Foreground(true));
    state.apply(ConnectivityEvent::Connected(false));
    assert!(!state.is_present());
}
