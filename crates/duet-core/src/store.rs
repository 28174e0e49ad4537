use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use duet_db::Database;
use duet_db::models::{HiddenRow, MessageRow, UserRow};
use duet_types::models::{
    ConversationKey, GlobalSettings, MAX_RETENTION_HOURS, Media, MediaKind, Message, Role, User,
};

use crate::error::{CoreError, CoreResult};

/// The persistent store the client core runs against.
///
/// Calls are blocking; async callers go through [`crate::hub::Hub`], which
/// moves them onto the blocking pool and publishes change events. Access
/// rules (who may delete for everyone, who may write settings, who may mark
/// a message seen) are enforced by the implementation, not by callers.
pub trait DocumentStore: Send + Sync + 'static {
    // -- Settings --

    fn load_settings(&self) -> CoreResult<Option<GlobalSettings>>;

    fn save_settings(&self, actor: Uuid, settings: &GlobalSettings) -> CoreResult<()>;

    // -- Messages --

    fn append_message(&self, message: &Message) -> CoreResult<()>;

    /// Conversation log ordered by creation time, oldest first.
    fn list_messages(&self, conversation: &ConversationKey) -> CoreResult<Vec<Message>>;

    fn get_message(&self, conversation: &ConversationKey, id: Uuid) -> CoreResult<Option<Message>>;

    /// Messages created strictly before `cutoff`.
    fn messages_before(
        &self,
        conversation: &ConversationKey,
        cutoff: DateTime<Utc>,
    ) -> CoreResult<Vec<Message>>;

    /// No effect when `viewer` is the author. Returns whether the flag changed.
    fn mark_seen(&self, conversation: &ConversationKey, id: Uuid, viewer: Uuid) -> CoreResult<bool>;

    fn set_saved(&self, conversation: &ConversationKey, id: Uuid, saved: bool) -> CoreResult<()>;

    /// Union `viewer` into the deletion set. Returns false if already present.
    fn hide_for(&self, conversation: &ConversationKey, id: Uuid, viewer: Uuid) -> CoreResult<bool>;

    fn delete_for_everyone(&self, conversation: &ConversationKey, id: Uuid, actor: Uuid) -> CoreResult<()>;

    /// Delete only if still unsaved and older than `cutoff`.
    fn delete_expired(
        &self,
        conversation: &ConversationKey,
        id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> CoreResult<bool>;

    // -- Users --

    fn register_user(&self, user: &User, password_hash: &str) -> CoreResult<()>;

    fn find_user(&self, username: &str) -> CoreResult<Option<User>>;

    fn get_user(&self, id: Uuid) -> CoreResult<Option<User>>;

    fn list_users_except(&self, user_id: Uuid) -> CoreResult<Vec<User>>;

    fn password_hash(&self, user_id: Uuid) -> CoreResult<Option<String>>;
}

impl DocumentStore for Database {
    fn load_settings(&self) -> CoreResult<Option<GlobalSettings>> {
        let row = self.get_settings()?;
        Ok(row.map(|row| GlobalSettings {
            wallpaper_url: row.wallpaper_url.filter(|u| !u.is_empty()),
            retention_hours: u32::try_from(row.retention_hours)
                .ok()
                .filter(|h| (1..=MAX_RETENTION_HOURS).contains(h))
                .unwrap_or_else(|| {
                    warn!("Corrupt retention_hours '{}' in settings", row.retention_hours);
                    GlobalSettings::default().retention_hours
                }),
        }))
    }

    fn save_settings(&self, actor: Uuid, settings: &GlobalSettings) -> CoreResult<()> {
        if !(1..=MAX_RETENTION_HOURS).contains(&settings.retention_hours) {
            return Err(CoreError::Validation(format!(
                "retention must be between 1 and {} hours",
                MAX_RETENTION_HOURS
            )));
        }
        self.put_settings(
            &actor.to_string(),
            settings.wallpaper_url.as_deref(),
            i64::from(settings.retention_hours),
            Utc::now().timestamp_millis(),
        )?;
        Ok(())
    }

    fn append_message(&self, message: &Message) -> CoreResult<()> {
        if !message.has_content() {
            return Err(CoreError::Validation("message needs text or media".into()));
        }
        self.insert_message(&MessageRow {
            id: message.id.to_string(),
            conversation: message.conversation.as_str().to_string(),
            author_id: message.author_id.to_string(),
            body: message.text.clone(),
            media_url: message.media.as_ref().map(|m| m.url.clone()),
            media_kind: message.media.as_ref().map(|m| m.kind.as_str().to_string()),
            seen: message.seen,
            saved: message.saved,
            created_at: message.created_at.timestamp_millis(),
        })?;
        for viewer in &message.deleted_for {
            self.hide_message(message.conversation.as_str(), &message.id.to_string(), &viewer.to_string())?;
        }
        Ok(())
    }

    fn list_messages(&self, conversation: &ConversationKey) -> CoreResult<Vec<Message>> {
        let rows = self.get_messages(conversation.as_str())?;
        let hidden = self.get_hidden_for_conversation(conversation.as_str())?;
        Ok(assemble(rows, &hidden))
    }

    fn get_message(&self, conversation: &ConversationKey, id: Uuid) -> CoreResult<Option<Message>> {
        let Some(row) = Database::get_message(self, conversation.as_str(), &id.to_string())? else {
            return Ok(None);
        };
        let hidden = self.get_hidden_for_conversation(conversation.as_str())?;
        Ok(assemble(vec![row], &hidden).pop())
    }

    fn messages_before(
        &self,
        conversation: &ConversationKey,
        cutoff: DateTime<Utc>,
    ) -> CoreResult<Vec<Message>> {
        let rows = self.get_messages_before(conversation.as_str(), cutoff.timestamp_millis())?;
        Ok(assemble(rows, &[]))
    }

    fn mark_seen(&self, conversation: &ConversationKey, id: Uuid, viewer: Uuid) -> CoreResult<bool> {
        Ok(Database::mark_seen(
            self,
            conversation.as_str(),
            &id.to_string(),
            &viewer.to_string(),
        )?)
    }

    fn set_saved(&self, conversation: &ConversationKey, id: Uuid, saved: bool) -> CoreResult<()> {
        Database::set_saved(self, conversation.as_str(), &id.to_string(), saved)?;
        Ok(())
    }

    fn hide_for(&self, conversation: &ConversationKey, id: Uuid, viewer: Uuid) -> CoreResult<bool> {
        Ok(self.hide_message(conversation.as_str(), &id.to_string(), &viewer.to_string())?)
    }

    fn delete_for_everyone(&self, conversation: &ConversationKey, id: Uuid, actor: Uuid) -> CoreResult<()> {
        self.delete_message(conversation.as_str(), &id.to_string(), &actor.to_string())?;
        Ok(())
    }

    fn delete_expired(
        &self,
        conversation: &ConversationKey,
        id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> CoreResult<bool> {
        Ok(self.delete_expired_message(
            conversation.as_str(),
            &id.to_string(),
            cutoff.timestamp_millis(),
        )?)
    }

    fn register_user(&self, user: &User, password_hash: &str) -> CoreResult<()> {
        self.create_user(
            &user.id.to_string(),
            &user.username,
            user.display_name.as_deref(),
            user.role.as_str(),
            password_hash,
            user.created_at.timestamp_millis(),
        )?;
        Ok(())
    }

    fn find_user(&self, username: &str) -> CoreResult<Option<User>> {
        Ok(self.get_user_by_username(username)?.and_then(user_from_row))
    }

    fn get_user(&self, id: Uuid) -> CoreResult<Option<User>> {
        Ok(self.get_user_by_id(&id.to_string())?.and_then(user_from_row))
    }

    fn list_users_except(&self, user_id: Uuid) -> CoreResult<Vec<User>> {
        let rows = Database::list_users_except(self, &user_id.to_string())?;
        Ok(rows.into_iter().filter_map(user_from_row).collect())
    }

    fn password_hash(&self, user_id: Uuid) -> CoreResult<Option<String>> {
        Ok(self.get_password_hash(&user_id.to_string())?)
    }
}

/// Rows with an unparseable id are dropped rather than surfaced half-built.
fn user_from_row(row: UserRow) -> Option<User> {
    let id = match row.id.parse::<Uuid>() {
        Ok(id) => id,
        Err(e) => {
            warn!("Corrupt user id '{}': {}", row.id, e);
            return None;
        }
    };
    Some(User {
        id,
        username: row.username,
        display_name: row.display_name,
        role: Role::parse(&row.role),
        created_at: millis_to_datetime(row.created_at),
    })
}

fn assemble(rows: Vec<MessageRow>, hidden: &[HiddenRow]) -> Vec<Message> {
    // Group deletion-set entries by message id
    let mut hidden_map: HashMap<&str, BTreeSet<Uuid>> = HashMap::new();
    for h in hidden {
        match h.viewer_id.parse::<Uuid>() {
            Ok(viewer) => {
                hidden_map.entry(h.message_id.as_str()).or_default().insert(viewer);
            }
            Err(e) => warn!("Corrupt viewer_id '{}' on message '{}': {}", h.viewer_id, h.message_id, e),
        }
    }

    rows.into_iter()
        .filter_map(|row| {
            let id = match row.id.parse::<Uuid>() {
                Ok(id) => id,
                Err(e) => {
                    warn!("Corrupt message id '{}': {}", row.id, e);
                    return None;
                }
            };
            let author_id = row.author_id.parse::<Uuid>().unwrap_or_else(|e| {
                warn!("Corrupt author_id '{}' on message '{}': {}", row.author_id, row.id, e);
                Uuid::default()
            });
            let media = match (row.media_url, row.media_kind.as_deref().and_then(MediaKind::parse)) {
                (Some(url), Some(kind)) => Some(Media { url, kind }),
                (Some(url), None) => {
                    warn!("Missing media kind on message '{}', assuming image", row.id);
                    Some(Media { url, kind: MediaKind::Image })
                }
                (None, _) => None,
            };
            let deleted_for = hidden_map.remove(row.id.as_str()).unwrap_or_default();

            Some(Message {
                id,
                conversation: ConversationKey::from_stored(row.conversation),
                author_id,
                created_at: millis_to_datetime(row.created_at),
                text: row.body,
                media,
                seen: row.seen,
                saved: row.saved,
                deleted_for,
            })
        })
        .collect()
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(|| {
        warn!("Corrupt timestamp '{}'", ms);
        DateTime::default()
    })
}
