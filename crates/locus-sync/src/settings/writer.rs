use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use locus_common::{EventBus, RemoteError, SyncEvent, UserId};
use locus_config::SettingsConfig;

use crate::backend::{with_timeout, DocumentStore, KeyValueCache};
use crate::model::{NotificationSettings, SettingKey};

/// What the writer knows about the bound user's remote settings document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(super) enum RemoteDoc {
    /// Not read yet, or the read failed.
    #[default]
    Unknown,
    Missing,
    Present,
}

#[derive(Default)]
pub(super) struct WriteQueue {
    /// User the queued writes belong to. `None` while signed out.
    pub user: Option<UserId>,
    /// Latest unflushed value per key. A newer value for a key replaces the
    /// queued one; a write already handed to the store is never replaced.
    pub pending: BTreeMap<SettingKey, bool>,
    pub remote: RemoteDoc,
}

pub(super) struct SettingsCore {
    pub documents: Arc<dyn DocumentStore>,
    pub cache: Arc<dyn KeyValueCache>,
    pub config: SettingsConfig,
    pub events: EventBus,
    pub state: watch::Sender<NotificationSettings>,
    pub queue: Mutex<WriteQueue>,
    /// Changes accepted while a `load` is resolving, replayed over the
    /// value it settles on. `None` when no load is running.
    pub load_changes: Mutex<Option<Vec<(SettingKey, bool)>>>,
    pub wake: Notify,
    pub idle: watch::Sender<bool>,
}

impl SettingsCore {
    pub fn queue(&self) -> MutexGuard<'_, WriteQueue> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn load_changes(&self) -> MutexGuard<'_, Option<Vec<(SettingKey, bool)>>> {
        self.load_changes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue `patch` for the bound user. Without one the change stays local.
    pub fn enqueue(&self, patch: &[(SettingKey, bool)]) -> bool {
        {
            let mut queue = self.queue();
            if queue.user.is_none() {
                debug!("No signed-in user, settings change kept local");
                return false;
            }
            queue.pending.extend(patch.iter().copied());
            self.idle.send_replace(false);
        }
        self.wake.notify_one();
        true
    }

    /// Record what is known about `user`'s remote document. Ignored if
    /// `user` is no longer bound.
    pub fn mark_remote(&self, user: &UserId, remote: RemoteDoc) {
        let mut queue = self.queue();
        if queue.user.as_ref() == Some(user) {
            queue.remote = remote;
        }
    }

    async fn probe(&self, user: &UserId) -> Result<RemoteDoc, RemoteError> {
        let doc = with_timeout(
            self.config.read_timeout(),
            self.documents.get(&self.config.collection, user.as_str()),
        )
        .await?;
        let remote = if doc.is_some() {
            RemoteDoc::Present
        } else {
            RemoteDoc::Missing
        };
        self.mark_remote(user, remote);
        Ok(remote)
    }

    /// Write `batch`. Until the remote document is known to exist the full
    /// current value is written instead, so the first write never leaves a
    /// partial document behind.
    async fn flush(&self, user: &UserId, batch: BTreeMap<SettingKey, bool>) {
        let known = self.queue().remote;
        let remote = match known {
            RemoteDoc::Unknown => match self.probe(user).await {
                Ok(remote) => remote,
                Err(e) => {
                    self.report_failure(user, batch.len(), &e);
                    return;
                }
            },
            known => known,
        };

        let entries: Vec<(SettingKey, bool)> = match remote {
            RemoteDoc::Present => batch.into_iter().collect(),
            RemoteDoc::Missing | RemoteDoc::Unknown => {
                let snapshot = *self.state.borrow();
                info!(user_id = %user, "Creating remote settings document");
                snapshot.entries()
            }
        };
        let fields: Map<String, Value> = entries
            .iter()
            .map(|(key, value)| (key.field_name().to_string(), Value::Bool(*value)))
            .collect();
        let count = fields.len();

        let result = with_timeout(
            self.config.write_timeout(),
            self.documents
                .set_merge(&self.config.collection, user.as_str(), Value::Object(fields)),
        )
        .await;

        match result {
            Ok(()) => {
                debug!(user_id = %user, fields = count, "Settings written");
                if remote != RemoteDoc::Present {
                    self.mark_remote(user, RemoteDoc::Present);
                }
            }
            Err(e) => self.report_failure(user, count, &e),
        }
    }

    fn report_failure(&self, user: &UserId, fields: usize, err: &RemoteError) {
        if err.is_unauthorized() {
            warn!(user_id = %user, error = %err, "Settings write rejected");
            self.events.publish(SyncEvent::SessionInvalid {
                operation: "settings.write".into(),
            });
        } else {
            warn!(user_id = %user, fields, error = %err, "Settings write failed");
            self.events.publish(SyncEvent::RemoteWriteFailed {
                operation: "settings.write".into(),
                reason: err.to_string(),
            });
        }
    }
}

/// Single writer for one signed-in user. Takes everything queued as one
/// batch and writes it with a single merge; failures are reported, not
/// retried.
pub(super) async fn run(core: Arc<SettingsCore>, user: UserId, cancel: CancellationToken) {
    debug!(user_id = %user, "Settings writer started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let batch = {
            let mut queue = core.queue();
            if queue.pending.is_empty() {
                core.idle.send_replace(true);
                None
            } else {
                Some(std::mem::take(&mut queue.pending))
            }
        };

        match batch {
            Some(batch) => core.flush(&user, batch).await,
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = core.wake.notified() => {}
                }
            }
        }
    }

    debug!(user_id = %user, "Settings writer stopped");
}
