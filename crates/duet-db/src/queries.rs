use crate::error::{MissingRecord, RuleViolation};
use crate::models::{HiddenRow, MessageRow, SettingsRow, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, Row};

const MESSAGE_COLUMNS: &str =
    "id, conversation, author_id, body, media_url, media_kind, seen, saved, created_at";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        display_name: Option<&str>,
        role: &str,
        password_hash: &str,
        created_at: i64,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, display_name, role, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, username, display_name, role, password_hash, created_at],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, display_name, role, created_at FROM users WHERE username = ?1",
            )?;
            let row = stmt.query_row([username], user_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, display_name, role, created_at FROM users WHERE id = ?1",
            )?;
            let row = stmt.query_row([id], user_from_row).optional()?;
            Ok(row)
        })
    }

    /// Every user except `user_id`, ordered by username.
    pub fn list_users_except(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, display_name, role, created_at FROM users
                 WHERE id != ?1
                 ORDER BY username ASC",
            )?;
            let rows = stmt
                .query_map([user_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_password_hash(&self, user_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let hash = conn
                .query_row("SELECT password FROM users WHERE id = ?1", [user_id], |row| row.get(0))
                .optional()?;
            Ok(hash)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, row: &MessageRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation, author_id, body, media_url, media_kind, seen, saved, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    row.id,
                    row.conversation,
                    row.author_id,
                    row.body,
                    row.media_url,
                    row.media_kind,
                    row.seen,
                    row.saved,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Full conversation log, oldest first.
    pub fn get_messages(&self, conversation: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation = ?1
                 ORDER BY created_at ASC, rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([conversation], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_message(&self, conversation: &str, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation = ?1 AND id = ?2"
            );
            let row = conn
                .query_row(&sql, [conversation, id], message_from_row)
                .optional()?;
            Ok(row)
        })
    }

    /// Messages created strictly before `cutoff_ms`.
    pub fn get_messages_before(&self, conversation: &str, cutoff_ms: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation = ?1 AND created_at < ?2
                 ORDER BY created_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![conversation, cutoff_ms], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Deletion-set entries for every message of a conversation.
    pub fn get_hidden_for_conversation(&self, conversation: &str) -> Result<Vec<HiddenRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT h.message_id, h.viewer_id FROM message_hidden h
                 JOIN messages m ON m.id = h.message_id
                 WHERE m.conversation = ?1",
            )?;
            let rows = stmt
                .query_map([conversation], |row| {
                    Ok(HiddenRow {
                        message_id: row.get(0)?,
                        viewer_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Set the seen flag on behalf of `viewer`. Only the recipient's write
    /// has an effect; returns whether a row changed.
    pub fn mark_seen(&self, conversation: &str, id: &str, viewer: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET seen = 1
                 WHERE conversation = ?1 AND id = ?2 AND author_id != ?3",
                [conversation, id, viewer],
            )?;
            if changed == 0 {
                ensure_message_exists(conn, conversation, id)?;
            }
            Ok(changed > 0)
        })
    }

    pub fn set_saved(&self, conversation: &str, id: &str, saved: bool) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET saved = ?3 WHERE conversation = ?1 AND id = ?2",
                rusqlite::params![conversation, id, saved],
            )?;
            if changed == 0 {
                return Err(missing(conversation, id));
            }
            Ok(())
        })
    }

    /// Add `viewer` to the message's deletion set. Returns false when the
    /// viewer was already a member.
    pub fn hide_message(&self, conversation: &str, id: &str, viewer: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            ensure_message_exists(conn, conversation, id)?;
            let added = conn.execute(
                "INSERT OR IGNORE INTO message_hidden (message_id, viewer_id) VALUES (?1, ?2)",
                [id, viewer],
            )?;
            Ok(added > 0)
        })
    }

    /// Permanently remove a message. Only its author or an admin may do this;
    /// the role is read from this store, never taken from the caller.
    pub fn delete_message(&self, conversation: &str, id: &str, actor: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let author: Option<String> = tx
                .query_row(
                    "SELECT author_id FROM messages WHERE conversation = ?1 AND id = ?2",
                    [conversation, id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(author) = author else {
                return Err(missing(conversation, id));
            };

            if author != actor && !is_admin(&tx, actor)? {
                return Err(RuleViolation::DeleteForEveryone {
                    actor: actor.to_string(),
                    message_id: id.to_string(),
                }
                .into());
            }

            tx.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Retention delete: removes the message only if it is still unsaved and
    /// still older than `cutoff_ms`. Returns whether it was removed.
    pub fn delete_expired_message(&self, conversation: &str, id: &str, cutoff_ms: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM messages
                 WHERE conversation = ?1 AND id = ?2 AND saved = 0 AND created_at < ?3",
                rusqlite::params![conversation, id, cutoff_ms],
            )?;
            Ok(removed > 0)
        })
    }

    // -- Settings --

    pub fn get_settings(&self) -> Result<Option<SettingsRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT wallpaper_url, retention_hours, updated_by, updated_at FROM settings WHERE id = 1",
                    [],
                    |row| {
                        Ok(SettingsRow {
                            wallpaper_url: row.get(0)?,
                            retention_hours: row.get(1)?,
                            updated_by: row.get(2)?,
                            updated_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Write the singleton settings record. Admins only.
    pub fn put_settings(
        &self,
        actor: &str,
        wallpaper_url: Option<&str>,
        retention_hours: i64,
        updated_at: i64,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            if !is_admin(conn, actor)? {
                return Err(RuleViolation::Settings { actor: actor.to_string() }.into());
            }
            conn.execute(
                "INSERT INTO settings (id, wallpaper_url, retention_hours, updated_by, updated_at)
                 VALUES (1, ?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    wallpaper_url = excluded.wallpaper_url,
                    retention_hours = excluded.retention_hours,
                    updated_by = excluded.updated_by,
                    updated_at = excluded.updated_at",
                rusqlite::params![wallpaper_url, retention_hours, actor, updated_at],
            )?;
            Ok(())
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        role: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation: row.get(1)?,
        author_id: row.get(2)?,
        body: row.get(3)?,
        media_url: row.get(4)?,
        media_kind: row.get(5)?,
        seen: row.get(6)?,
        saved: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn is_admin(conn: &Connection, user_id: &str) -> Result<bool> {
    let role: Option<String> = conn
        .query_row("SELECT role FROM users WHERE id = ?1", [user_id], |row| row.get(0))
        .optional()?;
    Ok(role.as_deref() == Some("admin"))
}

fn ensure_message_exists(conn: &Connection, conversation: &str, id: &str) -> Result<()> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM messages WHERE conversation = ?1 AND id = ?2",
            [conversation, id],
            |row| row.get(0),
        )
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(missing(conversation, id)),
    }
}

fn missing(conversation: &str, id: &str) -> anyhow::Error {
    MissingRecord {
        conversation: conversation.to_string(),
        message_id: id.to_string(),
    }
    .into()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "00000000-0000-0000-0000-00000000000a";
    const BOB: &str = "00000000-0000-0000-0000-00000000000b";
    const ROOT: &str = "00000000-0000-0000-0000-0000000000ff";
    const CONV: &str = "00000000-0000-0000-0000-00000000000b-00000000-0000-0000-0000-00000000000a";

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user(ALICE, "alice", None, "member", "x", 0).unwrap();
        db.create_user(BOB, "bob", Some("Bob"), "member", "x", 0).unwrap();
        db.create_user(ROOT, "root", None, "admin", "x", 0).unwrap();
        db
    }

    fn text_row(id: &str, author: &str, created_at: i64) -> MessageRow {
        MessageRow {
            id: id.into(),
            conversation: CONV.into(),
            author_id: author.into(),
            body: Some("hello".into()),
            media_url: None,
            media_kind: None,
            seen: false,
            saved: false,
            created_at,
        }
    }

    #[test]
    fn messages_come_back_oldest_first() {
        let db = seeded();
        db.insert_message(&text_row("m2", BOB, 20)).unwrap();
        db.insert_message(&text_row("m1", ALICE, 10)).unwrap();

        let ids: Vec<String> = db.get_messages(CONV).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn empty_message_is_rejected_by_schema() {
        let db = seeded();
        let mut row = text_row("m1", ALICE, 10);
        row.body = None;
        assert!(db.insert_message(&row).is_err());
    }

    #[test]
    fn range_query_is_strict() {
        let db = seeded();
        db.insert_message(&text_row("old", ALICE, 99)).unwrap();
        db.insert_message(&text_row("edge", ALICE, 100)).unwrap();

        let ids: Vec<String> = db
            .get_messages_before(CONV, 100)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["old"]);
    }

    #[test]
    fn author_cannot_mark_own_message_seen() {
        let db = seeded();
        db.insert_message(&text_row("m1", ALICE, 10)).unwrap();

        assert!(!db.mark_seen(CONV, "m1", ALICE).unwrap());
        assert!(!db.get_message(CONV, "m1").unwrap().unwrap().seen);

        assert!(db.mark_seen(CONV, "m1", BOB).unwrap());
        assert!(db.get_message(CONV, "m1").unwrap().unwrap().seen);
    }

    #[test]
    fn hide_is_a_set_union() {
        let db = seeded();
        db.insert_message(&text_row("m1", ALICE, 10)).unwrap();

        assert!(db.hide_message(CONV, "m1", BOB).unwrap());
        assert!(!db.hide_message(CONV, "m1", BOB).unwrap());
        assert!(db.hide_message(CONV, "m1", ALICE).unwrap());

        let hidden = db.get_hidden_for_conversation(CONV).unwrap();
        assert_eq!(hidden.len(), 2);
    }

    #[test]
    fn hide_missing_message_reports_missing_record() {
        let db = seeded();
        let err = db.hide_message(CONV, "nope", BOB).unwrap_err();
        assert!(err.downcast_ref::<MissingRecord>().is_some());
    }

    #[test]
    fn delete_for_everyone_requires_author_or_admin() {
        let db = seeded();
        db.insert_message(&text_row("m1", ALICE, 10)).unwrap();
        db.insert_message(&text_row("m2", ALICE, 11)).unwrap();
        db.hide_message(CONV, "m1", BOB).unwrap();

        let err = db.delete_message(CONV, "m1", BOB).unwrap_err();
        assert!(err.downcast_ref::<RuleViolation>().is_some());
        assert!(db.get_message(CONV, "m1").unwrap().is_some());

        db.delete_message(CONV, "m1", ALICE).unwrap();
        assert!(db.get_message(CONV, "m1").unwrap().is_none());
        assert!(db.get_hidden_for_conversation(CONV).unwrap().is_empty());

        db.delete_message(CONV, "m2", ROOT).unwrap();
        assert!(db.get_message(CONV, "m2").unwrap().is_none());
    }

    #[test]
    fn expired_delete_spares_saved_and_fresh_messages() {
        let db = seeded();
        db.insert_message(&text_row("old", ALICE, 10)).unwrap();
        db.insert_message(&text_row("kept", ALICE, 10)).unwrap();
        db.insert_message(&text_row("fresh", ALICE, 500)).unwrap();
        db.set_saved(CONV, "kept", true).unwrap();

        assert!(db.delete_expired_message(CONV, "old", 100).unwrap());
        assert!(!db.delete_expired_message(CONV, "kept", 100).unwrap());
        assert!(!db.delete_expired_message(CONV, "fresh", 100).unwrap());
        assert_eq!(db.get_messages(CONV).unwrap().len(), 2);
    }

    #[test]
    fn settings_are_admin_only() {
        let db = seeded();
        assert!(db.get_settings().unwrap().is_none());

        let err = db.put_settings(ALICE, None, 5, 1).unwrap_err();
        assert!(err.downcast_ref::<RuleViolation>().is_some());

        db.put_settings(ROOT, Some("https://example.com/w.png"), 5, 1).unwrap();
        db.put_settings(ROOT, None, 6, 2).unwrap();
        let row = db.get_settings().unwrap().unwrap();
        assert_eq!(row.retention_hours, 6);
        assert_eq!(row.wallpaper_url, None);
        assert_eq!(row.updated_by, ROOT);
    }

    #[test]
    fn zero_retention_violates_schema() {
        let db = seeded();
        assert!(db.put_settings(ROOT, None, 0, 1).is_err());
    }

    #[test]
    fn users_listing_excludes_caller() {
        let db = seeded();
        let names: Vec<String> = db
            .list_users_except(ALICE)
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["bob", "root"]);
    }
}
