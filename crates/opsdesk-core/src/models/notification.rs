use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationId(pub Uuid);

impl NotificationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Alert,
    Task,
    Info,
}

/// Either every current user, or an explicit list. Fan-out into per-user
/// delivered copies is the data store's responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipients {
    All,
    Users(Vec<UserId>),
}

impl Recipients {
    pub fn includes(&self, user: UserId) -> bool {
        match self {
            Self::All => true,
            Self::Users(ids) => ids.contains(&user),
        }
    }
}

/// A delivered notification copy. The read flag is per recipient: each
/// delivered copy carries its own, and it only ever moves false to true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub kind: NotificationKind,
    pub sender_id: UserId,
    pub recipients: Recipients,
    pub sent_at: DateTime<Utc>,
    pub read: bool,
}

/// Input for sending a notification; id, timestamp and read state are
/// assigned at the store boundary.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub kind: NotificationKind,
    pub recipients: Recipients,
}
