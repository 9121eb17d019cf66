use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use locus_common::{EventBus, SyncError, SyncEvent, UserId};
use locus_config::SettingsConfig;

use super::writer::{self, RemoteDoc, SettingsCore, WriteQueue};
use crate::backend::{with_timeout, DocumentStore, KeyValueCache};
use crate::model::{NotificationSettings, SettingKey};

const CACHE_KEY: &str = "notification_settings";

/// Where the value chosen by [`NotificationSettingsStore::load`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Remote,
    Cache,
    Defaults,
}

impl Source {
    fn as_str(self) -> &'static str {
        match self {
            Source::Remote => "remote",
            Source::Cache => "cache",
            Source::Defaults => "defaults",
        }
    }
}

struct Writer {
    user: UserId,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the notification preference flags.
///
/// The reactive container (a watch channel) is updated first, then the
/// local cache, then the remote document through a single background
/// writer. `allNotifications = false` always implies every other flag is
/// false.
pub struct NotificationSettingsStore {
    core: Arc<SettingsCore>,
    writer: Mutex<Option<Writer>>,
}

impl NotificationSettingsStore {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        cache: Arc<dyn KeyValueCache>,
        config: SettingsConfig,
        events: EventBus,
    ) -> Self {
        Self {
            core: Arc::new(SettingsCore {
                documents,
                cache,
                config,
                events,
                state: watch::channel(NotificationSettings::default()).0,
                queue: StdMutex::new(WriteQueue::default()),
                load_changes: StdMutex::new(None),
                wake: Notify::new(),
                idle: watch::channel(true).0,
            }),
            writer: Mutex::new(None),
        }
    }

    /// Reconcile cache, container and remote document. Run once per
    /// session start.
    ///
    /// Remote wins when present. A missing remote document is seeded from
    /// the cache, or from defaults when the cache is empty too. The cache
    /// always ends up holding the chosen value. Without a user only the
    /// cache is consulted. Changes made through [`Self::set_preference`]
    /// while the reads are pending are replayed over the chosen value.
    ///
    /// Returns `SessionInvalid` when the remote read is rejected; the
    /// container still holds the local value in that case.
    pub async fn load(&self, user: Option<&UserId>) -> Result<NotificationSettings, SyncError> {
        self.core.load_changes().get_or_insert_with(Vec::new);
        if let Some(user) = user {
            self.bind(user).await;
        }

        let (local, local_source) = match self.read_cache().await {
            Some(cached) => (cached, Source::Cache),
            None => (NotificationSettings::default(), Source::Defaults),
        };

        let Some(user) = user else {
            let (settings, _) = self.apply(local, local_source).await;
            return Ok(settings);
        };

        let read = with_timeout(
            self.core.config.read_timeout(),
            self.core
                .documents
                .get(&self.core.config.collection, user.as_str()),
        )
        .await;

        // `push` asks for the whole chosen value to be written back.
        let mut outcome = Ok(());
        let (chosen, source, push) = match read {
            Ok(Some(doc)) => match serde_json::from_value::<NotificationSettings>(doc) {
                Ok(remote) => {
                    self.core.mark_remote(user, RemoteDoc::Present);
                    let normalized = remote.normalized();
                    let repair = normalized != remote;
                    if repair {
                        info!(user_id = %user, "Repairing remote settings that break the cascade");
                    }
                    (normalized, Source::Remote, repair)
                }
                Err(e) => {
                    warn!(user_id = %user, error = %e, "Remote settings unreadable, keeping local");
                    (local, local_source, false)
                }
            },
            Ok(None) => {
                self.core.mark_remote(user, RemoteDoc::Missing);
                info!(user_id = %user, source = local_source.as_str(), "Seeding remote settings");
                (local, local_source, true)
            }
            Err(e) if e.is_unauthorized() => {
                warn!(user_id = %user, error = %e, "Settings read rejected");
                outcome = Err(SyncError::from(e));
                (local, local_source, false)
            }
            Err(e) => {
                warn!(user_id = %user, error = %e, "Settings read failed, keeping local");
                (local, local_source, false)
            }
        };

        let (settings, replayed) = self.apply(chosen, source).await;
        // Changes replayed over the remote value were written as patches
        // against the old document, so the merged value is written whole.
        if push || (replayed && source == Source::Remote) {
            self.core.enqueue(&settings.entries());
        }
        outcome.map(|()| settings)
    }

    /// Change one flag.
    ///
    /// The container and cache update immediately and the remote write is
    /// queued. Turning `allNotifications` off turns every flag off in one
    /// batched write. Turning a dependent flag on while
    /// `allNotifications` is off fails with `PolicyViolation` and changes
    /// nothing.
    pub async fn set_preference(
        &self,
        key: SettingKey,
        value: bool,
    ) -> Result<NotificationSettings, SyncError> {
        let mut patch: Vec<(SettingKey, bool)> = Vec::new();
        let mut outcome = Ok(());

        let changed = self.core.state.send_if_modified(|settings| {
            patch = match cascade_patch(settings, key, value) {
                Ok(patch) => patch,
                Err(e) => {
                    outcome = Err(e);
                    return false;
                }
            };
            if let Some(changes) = self.core.load_changes().as_mut() {
                changes.push((key, value));
            }

            let before = *settings;
            for (k, v) in &patch {
                settings.set(*k, *v);
            }
            *settings != before
        });

        if let Err(e) = outcome {
            debug!(%key, value, "Rejected settings change");
            return Err(e);
        }

        let snapshot = self.get_snapshot();
        if !changed {
            debug!(%key, value, "Settings unchanged");
            return Ok(snapshot);
        }

        self.write_cache(&snapshot).await;
        self.core.events.publish(SyncEvent::SettingsChanged {
            key: key.to_string(),
            enabled: value,
        });
        self.core.enqueue(&patch);
        Ok(snapshot)
    }

    pub fn get_snapshot(&self) -> NotificationSettings {
        *self.core.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationSettings> {
        self.core.state.subscribe()
    }

    /// Unbind the signed-in user. Queued writes are dropped; an in-flight
    /// write finishes.
    pub async fn detach(&self) {
        let mut writer = self.writer.lock().await;
        if let Some(current) = writer.take() {
            self.stop_writer(current).await;
        }
    }

    /// Resolve once the remote write queue is drained.
    pub async fn wait_idle(&self) {
        let mut idle = self.core.idle.subscribe();
        let _ = idle.wait_for(|idle| *idle).await;
    }

    async fn bind(&self, user: &UserId) {
        let mut writer = self.writer.lock().await;
        if writer.as_ref().is_some_and(|current| &current.user == user) {
            return;
        }
        if let Some(previous) = writer.take() {
            self.stop_writer(previous).await;
        }

        {
            let mut queue = self.core.queue();
            queue.user = Some(user.clone());
            queue.pending.clear();
            queue.remote = RemoteDoc::Unknown;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(writer::run(self.core.clone(), user.clone(), cancel.clone()));
        *writer = Some(Writer {
            user: user.clone(),
            cancel,
            handle,
        });
    }

    async fn stop_writer(&self, writer: Writer) {
        let dropped = {
            let mut queue = self.core.queue();
            queue.user = None;
            let dropped = queue.pending.len();
            queue.pending.clear();
            dropped
        };

        writer.cancel.cancel();
        if let Err(e) = writer.handle.await {
            warn!(user_id = %writer.user, error = %e, "Settings writer ended abnormally");
        }
        self.core.idle.send_replace(true);
        info!(user_id = %writer.user, dropped, "Settings store detached");
    }

    async fn read_cache(&self) -> Option<NotificationSettings> {
        let raw = match self.core.cache.get(CACHE_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Settings cache unreadable");
                return None;
            }
        };
        match serde_json::from_str::<NotificationSettings>(&raw) {
            Ok(settings) => Some(settings.normalized()),
            Err(e) => {
                warn!(error = %e, "Discarding malformed cached settings");
                None
            }
        }
    }

    async fn write_cache(&self, settings: &NotificationSettings) {
        let raw = match serde_json::to_string(settings) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to encode settings for cache");
                return;
            }
        };
        if let Err(e) = self.core.cache.set(CACHE_KEY, &raw).await {
            warn!(error = %e, "Failed to cache settings");
        }
    }

    /// Settle the container on `chosen` with any changes made during the
    /// load replayed on top. Returns the settled value and whether anything
    /// was replayed.
    async fn apply(
        &self,
        chosen: NotificationSettings,
        source: Source,
    ) -> (NotificationSettings, bool) {
        let mut settled = chosen;
        let mut replayed = 0;
        self.core.state.send_modify(|settings| {
            let changes = self.core.load_changes().take().unwrap_or_default();
            replayed = changes.len();
            settled = replay(chosen, &changes);
            *settings = settled;
        });
        if replayed > 0 {
            debug!(changes = replayed, "Replayed settings changes made during load");
        }

        self.write_cache(&self.get_snapshot()).await;
        debug!(source = source.as_str(), "Settings reconciled");
        self.core.events.publish(SyncEvent::SettingsReconciled {
            source: source.as_str().into(),
        });
        (settled, replayed > 0)
    }
}

/// Flags touched by setting `key` to `value`, or `PolicyViolation` when the
/// change would break the cascade.
fn cascade_patch(
    settings: &NotificationSettings,
    key: SettingKey,
    value: bool,
) -> Result<Vec<(SettingKey, bool)>, SyncError> {
    if key.is_dependent() && value && !settings.all_notifications {
        return Err(SyncError::PolicyViolation(format!(
            "cannot enable {key} while allNotifications is disabled"
        )));
    }
    if key == SettingKey::AllNotifications && !value {
        return Ok(SettingKey::ALL.iter().map(|k| (*k, false)).collect());
    }
    Ok(vec![(key, value)])
}

/// Apply `changes` in order over `base` under the same rules as
/// `set_preference`. Changes the cascade forbids on `base` are skipped.
fn replay(
    mut base: NotificationSettings,
    changes: &[(SettingKey, bool)],
) -> NotificationSettings {
    for (key, value) in changes {
        if let Ok(patch) = cascade_patch(&base, *key, *value) {
            for (k, v) in patch {
                base.set(k, v);
            }
        }
    }
    base
}
