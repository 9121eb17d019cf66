//! Records shared between the sync components and the remote stores.
//!
//! Field names serialize in camelCase to match the documents the mobile
//! clients already read.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use locus_common::DeviceId;

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Ios,
    Android,
    Web,
    Desktop,
}

/// One installation's push registration inside a user's device map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    pub push_token: String,
    pub platform: Platform,
    pub device_name: String,
    pub registered_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Offline,
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresenceState::Online => write!(f, "online"),
            PresenceState::Offline => write!(f, "offline"),
        }
    }
}

/// The single authoritative presence record of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub state: PresenceState,
    /// Epoch milliseconds.
    #[serde(rename = "lastSeen")]
    pub last_seen_ms: i64,
}

impl PresenceRecord {
    pub fn now(state: PresenceState) -> Self {
        Self {
            state,
            last_seen_ms: Utc::now().timestamp_millis(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.state == PresenceState::Online
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.last_seen_ms)
    }
}

// ---------------------------------------------------------------------------
// Notification settings
// ---------------------------------------------------------------------------

/// One notification preference flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingKey {
    AllNotifications,
    NewFriends,
    Messages,
    ActivityUpdates,
    LikeNotifications,
    CommentNotifications,
    EmailNotifications,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::AllNotifications,
        SettingKey::NewFriends,
        SettingKey::Messages,
        SettingKey::ActivityUpdates,
        SettingKey::LikeNotifications,
        SettingKey::CommentNotifications,
        SettingKey::EmailNotifications,
    ];

    /// Keys forced off whenever `allNotifications` is off.
    pub const DEPENDENTS: [SettingKey; 6] = [
        SettingKey::NewFriends,
        SettingKey::Messages,
        SettingKey::ActivityUpdates,
        SettingKey::LikeNotifications,
        SettingKey::CommentNotifications,
        SettingKey::EmailNotifications,
    ];

    /// Field name in the stored settings document.
    pub fn field_name(self) -> &'static str {
        match self {
            SettingKey::AllNotifications => "allNotifications",
            SettingKey::NewFriends => "newFriends",
            SettingKey::Messages => "messages",
            SettingKey::ActivityUpdates => "activityUpdates",
            SettingKey::LikeNotifications => "likeNotifications",
            SettingKey::CommentNotifications => "commentNotifications",
            SettingKey::EmailNotifications => "emailNotifications",
        }
    }

    pub fn is_dependent(self) -> bool {
        self != SettingKey::AllNotifications
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown notification setting: {0}")]
pub struct UnknownSettingKey(pub String);

impl FromStr for SettingKey {
    type Err = UnknownSettingKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.field_name() == s)
            .ok_or_else(|| UnknownSettingKey(s.to_string()))
    }
}

/// Notification preference flags.
///
/// Invariant: `all_notifications == false` implies every other flag is
/// `false`. Values coming from outside (cache, remote) go through
/// [`NotificationSettings::normalized`] before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    pub all_notifications: bool,
    pub new_friends: bool,
    pub messages: bool,
    pub activity_updates: bool,
    pub like_notifications: bool,
    pub comment_notifications: bool,
    pub email_notifications: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            all_notifications: true,
            new_friends: true,
            messages: true,
            activity_updates: true,
            like_notifications: true,
            comment_notifications: true,
            email_notifications: false,
        }
    }
}

impl NotificationSettings {
    pub fn get(&self, key: SettingKey) -> bool {
        match key {
            SettingKey::AllNotifications => self.all_notifications,
            SettingKey::NewFriends => self.new_friends,
            SettingKey::Messages => self.messages,
            SettingKey::ActivityUpdates => self.activity_updates,
            SettingKey::LikeNotifications => self.like_notifications,
            SettingKey::CommentNotifications => self.comment_notifications,
            SettingKey::EmailNotifications => self.email_notifications,
        }
    }

    pub(crate) fn set(&mut self, key: SettingKey, value: bool) {
        let slot = match key {
            SettingKey::AllNotifications => &mut self.all_notifications,
            SettingKey::NewFriends => &mut self.new_friends,
            SettingKey::Messages => &mut self.messages,
            SettingKey::ActivityUpdates => &mut self.activity_updates,
            SettingKey::LikeNotifications => &mut self.like_notifications,
            SettingKey::CommentNotifications => &mut self.comment_notifications,
            SettingKey::EmailNotifications => &mut self.email_notifications,
        };
        *slot = value;
    }

    pub fn satisfies_cascade(&self) -> bool {
        self.all_notifications || SettingKey::DEPENDENTS.iter().all(|k| !self.get(*k))
    }

    /// Copy with the cascade rule enforced.
    pub fn normalized(mut self) -> Self {
        if !self.all_notifications {
            for key in SettingKey::DEPENDENTS {
                self.set(key, false);
            }
        }
        self
    }

    /// Every flag as a `(key, value)` pair, in [`SettingKey::ALL`] order.
    pub fn entries(&self) -> Vec<(SettingKey, bool)> {
        SettingKey::ALL.iter().map(|k| (*k, self.get(*k))).collect()
    }
}
