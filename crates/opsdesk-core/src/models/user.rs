use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Account role. Immutable after provisioning; gates admin-only operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Frontend,
    Medical,
    Designer,
    Java,
    Database,
    Homeo,
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Admin => "Administrator",
            Self::Frontend => "Frontend Developer",
            Self::Medical => "Medical Advisor",
            Self::Designer => "Designer",
            Self::Java => "Java Developer",
            Self::Database => "Database & Auth",
            Self::Homeo => "Homeo Advisor",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub avatar: String,
    pub role: Role,
    pub is_online: bool,
    pub last_active: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    /// Unread inbound messages across all conversations, maintained by the store.
    pub unread_messages: u32,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}
