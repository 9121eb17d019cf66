use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use locus_config::ConnectivityConfig;

use super::types::{ConnectivityEvent, ConnectivityState, SubscriptionToken};

type Callback = Arc<dyn Fn(ConnectivityEvent) + Send + Sync>;

#[derive(Default)]
struct Shared {
    subscribers: Mutex<BTreeMap<SubscriptionToken, Callback>>,
    next_token: AtomicU64,
    state: Mutex<ConnectivityState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn emit(&self, event: ConnectivityEvent) {
        lock(&self.state).apply(event);
        let callbacks: Vec<Callback> = lock(&self.subscribers).values().cloned().collect();
        debug!(?event, subscribers = callbacks.len(), "Connectivity settled");
        for callback in callbacks {
            callback(event);
        }
    }
}

/// Observes reachability and foreground/background transitions and emits
/// debounced change events.
///
/// Dropping the monitor stops its debounce task.
pub struct ConnectivityMonitor {
    shared: Arc<Shared>,
    signals: mpsc::UnboundedSender<ConnectivityEvent>,
    cancel: CancellationToken,
}

impl ConnectivityMonitor {
    /// Start the debounce task on the current tokio runtime.
    pub fn spawn(config: &ConnectivityConfig) -> Self {
        let shared = Arc::new(Shared::default());
        let (signals, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let windows = Windows {
            reachability: config.reachability_debounce(),
            lifecycle: config.lifecycle_debounce(),
        };
        tokio::spawn(debounce_loop(shared.clone(), rx, cancel.clone(), windows));

        Self {
            shared,
            signals,
            cancel,
        }
    }

    /// Register `callback` for every settled change. Callbacks run on the
    /// monitor's task and must not block.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionToken
    where
        F: Fn(ConnectivityEvent) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(self.shared.next_token.fetch_add(1, Ordering::Relaxed));
        lock(&self.shared.subscribers).insert(token, Arc::new(callback));
        token
    }

    /// Returns `false` if the token was not subscribed.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        lock(&self.shared.subscribers).remove(&token).is_some()
    }

    pub fn report_reachability(&self, connected: bool) {
        let _ = self.signals.send(ConnectivityEvent::Connected(connected));
    }

    pub fn report_foreground(&self, foreground: bool) {
        let _ = self.signals.send(ConnectivityEvent::Foreground(foreground));
    }

    /// Last emitted state.
    pub fn current(&self) -> ConnectivityState {
        *lock(&self.shared.state)
    }

    /// Stop the debounce task. Unsettled signals are dropped.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            info!("Connectivity monitor shutting down");
            self.cancel.cancel();
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Clone, Copy)]
struct Windows {
    reachability: Duration,
    lifecycle: Duration,
}

/// Latest raw value of one signal kind and when it settles.
#[derive(Default)]
struct Pending {
    value: Option<(bool, Instant)>,
}

impl Pending {
    fn restart(&mut self, value: bool, window: Duration) {
        self.value = Some((value, Instant::now() + window));
    }

    fn deadline(&self) -> Option<Instant> {
        self.value.map(|(_, deadline)| deadline)
    }

    /// Take the value if its window has elapsed.
    fn settle(&mut self, now: Instant) -> Option<bool> {
        match self.value {
            Some((value, deadline)) if deadline <= now => {
                self.value = None;
                Some(value)
            }
            _ => None,
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn debounce_loop(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<ConnectivityEvent>,
    cancel: CancellationToken,
    windows: Windows,
) {
    let mut reachability = Pending::default();
    let mut lifecycle = Pending::default();
    // Baseline for change detection is the assumed launch state.
    let mut emitted = ConnectivityState::default();

    loop {
        let deadline = match (reachability.deadline(), lifecycle.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            signal = rx.recv() => match signal {
                Some(ConnectivityEvent::Connected(value)) => {
                    reachability.restart(value, windows.reachability);
                }
                Some(ConnectivityEvent::Foreground(value)) => {
                    lifecycle.restart(value, windows.lifecycle);
                }
                None => break,
            },
            _ = sleep_until(deadline) => {
                let now = Instant::now();
                if let Some(connected) = reachability.settle(now) {
                    if connected != emitted.connected {
                        emitted.connected = connected;
                        shared.emit(ConnectivityEvent::Connected(connected));
                    }
                }
                if let Some(foreground) = lifecycle.settle(now) {
                    if foreground != emitted.foreground {
                        emitted.foreground = foreground;
                        shared.emit(ConnectivityEvent::Foreground(foreground));
                    }
                }
            }
        }
    }

    debug!("Connectivity debounce task stopped");
}
