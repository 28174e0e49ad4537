use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retention window applied when no settings record exists yet.
pub const DEFAULT_RETENTION_HOURS: u32 = 24;

/// Longest accepted retention window, one hundred years.
pub const MAX_RETENTION_HOURS: u32 = 24 * 365 * 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    /// Unknown role strings are treated as the unprivileged role.
    pub fn parse(s: &str) -> Self {
        match s {
            "admin" => Self::Admin,
            _ => Self::Member,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// The signed-in user as reported by the identity provider. Read-only here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Order-independent key of a two-party thread.
///
/// Both participants derive the same key no matter who opens the thread:
/// the lexicographically greater id comes first, joined with `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn between(a: Uuid, b: Uuid) -> Self {
        let (a, b) = (a.to_string(), b.to_string());
        if a > b {
            Self(format!("{}-{}", a, b))
        } else {
            Self(format!("{}-{}", b, a))
        }
    }

    /// Wrap a key read back from storage.
    pub fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub url: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation: ConversationKey,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub text: Option<String>,
    pub media: Option<Media>,
    pub seen: bool,
    /// Saved messages are exempt from the retention sweep.
    pub saved: bool,
    /// Participants who hid this message from their own view.
    #[serde(default)]
    pub deleted_for: BTreeSet<Uuid>,
}

impl Message {
    /// A message needs non-blank text or an attached media URL.
    pub fn has_content(&self) -> bool {
        let has_text = self.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        let has_media = self.media.as_ref().is_some_and(|m| !m.url.trim().is_empty());
        has_text || has_media
    }

    pub fn is_hidden_for(&self, viewer: Uuid) -> bool {
        self.deleted_for.contains(&viewer)
    }

    pub fn is_incoming_for(&self, viewer: Uuid) -> bool {
        self.author_id != viewer
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSettings {
    pub wallpaper_url: Option<String>,
    pub retention_hours: u32,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            wallpaper_url: None,
            retention_hours: DEFAULT_RETENTION_HOURS,
        }
    }
}
