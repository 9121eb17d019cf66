use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use locus_common::{EventBus, RemoteError, SyncEvent, UserId};
use locus_config::PresenceConfig;

use crate::backend::{server_timestamp, with_timeout, RealtimeStore};
use crate::connectivity::ConnectivityState;
use crate::model::{PresenceRecord, PresenceState};

pub(super) struct TrackerState {
    pub connectivity: ConnectivityState,
    pub user: Option<UserId>,
    pub epoch: u64,
    /// Last target handed to the store in this epoch, confirmed or dropped.
    pub attempted: Option<PresenceState>,
}

/// State shared between the tracker handle and its worker task.
pub(super) struct PresenceCore {
    pub realtime: Arc<dyn RealtimeStore>,
    pub config: PresenceConfig,
    pub events: EventBus,
    pub state: Mutex<TrackerState>,
    pub wake: Notify,
    pub idle: watch::Sender<bool>,
    pub record: watch::Sender<Option<PresenceRecord>>,
}

impl PresenceCore {
    pub fn new(realtime: Arc<dyn RealtimeStore>, config: PresenceConfig, events: EventBus) -> Self {
        Self {
            realtime,
            config,
            events,
            state: Mutex::new(TrackerState {
                connectivity: ConnectivityState::default(),
                user: None,
                epoch: 0,
                attempted: None,
            }),
            wake: Notify::new(),
            idle: watch::channel(true).0,
            record: watch::channel(None).0,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn path(&self, user: &UserId) -> String {
        format!("{}/{}", self.config.status_path, user)
    }

    /// One write sequence, no retry.
    async fn write_presence(&self, user: &UserId, state: PresenceState) -> Result<PresenceRecord, RemoteError> {
        let path = self.path(user);
        let limit = self.config.write_timeout();
        let record = PresenceRecord::now(state);
        let value = serde_json::to_value(record)?;

        match state {
            PresenceState::Online => {
                let fallback = json!({
                    "state": PresenceState::Offline,
                    "lastSeen": server_timestamp(),
                });
                with_timeout(limit, self.realtime.on_disconnect_set(&path, fallback)).await?;
                with_timeout(limit, self.realtime.set(&path, value)).await?;
            }
            PresenceState::Offline => {
                // An armed fallback must never land after this write.
                with_timeout(limit, self.realtime.cancel_on_disconnect(&path)).await?;
                with_timeout(limit, self.realtime.set(&path, value)).await?;
            }
        }
        Ok(record)
    }

    /// Write with one retry after the configured backoff on transient
    /// failures. Returns whether the record was stored.
    ///
    /// Cancelling `cancel` abandons a pending retry; an in-flight write is
    /// always allowed to finish.
    pub async fn write_with_retry(
        &self,
        user: &UserId,
        state: PresenceState,
        cancel: &CancellationToken,
    ) -> bool {
        let err = match self.write_presence(user, state).await {
            Ok(record) => {
                self.confirm(user, record);
                return true;
            }
            Err(e) => e,
        };

        if err.is_unauthorized() {
            warn!(user_id = %user, %state, error = %err, "Presence write rejected, dropping");
            return false;
        }
        if !err.is_transient() {
            self.report_failure(user, state, &err);
            return false;
        }

        debug!(user_id = %user, %state, error = %err, "Presence write failed, retrying");
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(user_id = %user, %state, "Presence retry cancelled");
                return false;
            }
            _ = tokio::time::sleep(self.config.retry_backoff()) => {}
        }

        match self.write_presence(user, state).await {
            Ok(record) => {
                self.confirm(user, record);
                true
            }
            Err(e) if e.is_unauthorized() => {
                warn!(user_id = %user, %state, error = %e, "Presence write rejected, dropping");
                false
            }
            Err(e) => {
                self.report_failure(user, state, &e);
                false
            }
        }
    }

    fn confirm(&self, user: &UserId, record: PresenceRecord) {
        debug!(user_id = %user, state = %record.state, "Presence written");
        self.record.send_replace(Some(record));
        self.events.publish(SyncEvent::PresenceChanged {
            user_id: user.to_string(),
            online: record.is_online(),
        });
    }

    fn report_failure(&self, user: &UserId, state: PresenceState, err: &RemoteError) {
        warn!(user_id = %user, %state, error = %err, "Presence write dropped");
        self.events.publish(SyncEvent::RemoteWriteFailed {
            operation: format!("presence.{state}"),
            reason: err.to_string(),
        });
    }

    pub fn poke(&self) {
        self.wake.notify_one();
    }
}

/// Worker loop of one connection epoch.
///
/// Sleeps until poked, then writes the derived target if it differs from
/// the last attempted one. Exits when the epoch ends.
pub(super) async fn run(core: Arc<PresenceCore>, user: UserId, epoch: u64, cancel: CancellationToken) {
    info!(user_id = %user, epoch, "Presence worker started");

    loop {
        let target = {
            let mut state = core.lock();
            if state.epoch != epoch {
                break;
            }
            let target = if state.connectivity.is_present() {
                PresenceState::Online
            } else {
                PresenceState::Offline
            };
            if state.attempted == Some(target) {
                core.idle.send_replace(true);
                None
            } else {
                state.attempted = Some(target);
                Some(target)
            }
        };

        match target {
            Some(target) => {
                core.write_with_retry(&user, target, &cancel).await;
            }
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = core.wake.notified() => {}
                }
            }
        }
    }

    debug!(user_id = %user, epoch, "Presence worker stopped");
}
