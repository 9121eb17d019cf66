use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use locus_common::{EventBus, UserId};
use locus_config::PresenceConfig;

use super::worker::{self, PresenceCore};
use crate::backend::RealtimeStore;
use crate::connectivity::ConnectivityEvent;
use crate::model::{PresenceRecord, PresenceState};

struct Session {
    user: UserId,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

/// Maintains the signed-in user's presence record.
///
/// Feed it settled connectivity changes through
/// [`PresenceTracker::on_connectivity_change`]; it writes Online while the
/// app is connected and foregrounded and Offline otherwise, only when that
/// target changes.
pub struct PresenceTracker {
    core: Arc<PresenceCore>,
    session: Mutex<Option<Session>>,
}

impl PresenceTracker {
    pub fn new(realtime: Arc<dyn RealtimeStore>, config: PresenceConfig, events: EventBus) -> Self {
        Self {
            core: Arc::new(PresenceCore::new(realtime, config, events)),
            session: Mutex::new(None),
        }
    }

    /// Begin tracking `user`.
    ///
    /// No-op if `user` is already tracked. A different tracked user is
    /// stopped first.
    pub async fn start(&self, user: &UserId) {
        let mut session = self.session.lock().await;

        if let Some(current) = session.as_ref() {
            if &current.user == user {
                debug!(user_id = %user, "Presence already tracked");
                return;
            }
        }
        if let Some(previous) = session.take() {
            info!(from = %previous.user, to = %user, "Switching tracked user");
            self.end_session(previous).await;
        }

        if !self.core.config.enabled {
            info!(user_id = %user, "Presence tracking disabled by config");
            return;
        }

        let epoch = {
            let mut state = self.core.lock();
            state.epoch += 1;
            state.user = Some(user.clone());
            state.attempted = None;
            self.core.idle.send_replace(false);
            state.epoch
        };

        let cancel = CancellationToken::new();
        let worker = tokio::spawn(worker::run(
            self.core.clone(),
            user.clone(),
            epoch,
            cancel.clone(),
        ));

        *session = Some(Session {
            user: user.clone(),
            cancel,
            worker,
        });
    }

    /// Stop tracking: cancel pending retries, then cancel the disconnect
    /// fallback and write Offline. Used on sign-out.
    pub async fn stop(&self) {
        let mut session = self.session.lock().await;
        match session.take() {
            Some(current) => self.end_session(current).await,
            None => debug!("Presence stop with no tracked user"),
        }
    }

    async fn end_session(&self, session: Session) {
        {
            let mut state = self.core.lock();
            state.epoch += 1;
            state.user = None;
            state.attempted = None;
            self.core.idle.send_replace(false);
        }

        session.cancel.cancel();
        if let Err(e) = session.worker.await {
            warn!(user_id = %session.user, error = %e, "Presence worker ended abnormally");
        }

        // The worker is gone, so this is the only write for the user.
        let never = CancellationToken::new();
        self.core
            .write_with_retry(&session.user, PresenceState::Offline, &never)
            .await;

        self.core.idle.send_replace(true);
        info!(user_id = %session.user, "Presence tracking stopped");
    }

    /// Deliver a settled connectivity change. Never blocks.
    pub fn on_connectivity_change(&self, event: ConnectivityEvent) {
        let tracking = {
            let mut state = self.core.lock();
            state.connectivity.apply(event);
            if state.user.is_some() {
                self.core.idle.send_replace(false);
                true
            } else {
                false
            }
        };
        if tracking {
            self.core.poke();
        }
    }

    /// Whether the last confirmed record is Online.
    pub fn is_online(&self) -> bool {
        let record = *self.core.record.borrow();
        record.is_some_and(|record| record.is_online())
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        let record = *self.core.record.borrow();
        record.and_then(|record| record.last_seen())
    }

    /// Last confirmed record, updated after every successful write.
    pub fn subscribe(&self) -> watch::Receiver<Option<PresenceRecord>> {
        self.core.record.subscribe()
    }

    pub fn tracked_user(&self) -> Option<UserId> {
        self.core.lock().user.clone()
    }

    /// Resolve once no write is in flight or pending.
    pub async fn wait_idle(&self) {
        let mut idle = self.core.idle.subscribe();
        let _ = idle.wait_for(|idle| *idle).await;
    }
}
