use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                display_name    TEXT,
                role            TEXT NOT NULL DEFAULT 'member',
                password        TEXT NOT NULL,
                created_at      INTEGER NOT NULL
            );

            -- One append-only log per conversation key
            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                conversation    TEXT NOT NULL,
                author_id       TEXT NOT NULL,
                body            TEXT,
                media_url       TEXT,
                media_kind      TEXT,
                seen            INTEGER NOT NULL DEFAULT 0,
                saved           INTEGER NOT NULL DEFAULT 0,
                created_at      INTEGER NOT NULL,
                CHECK (body IS NOT NULL OR media_url IS NOT NULL)
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation, created_at);

            -- Per-viewer deletion set; only ever grows
            CREATE TABLE message_hidden (
                message_id      TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                viewer_id       TEXT NOT NULL,
                PRIMARY KEY (message_id, viewer_id)
            );

            -- Singleton global settings record
            CREATE TABLE settings (
                id              INTEGER PRIMARY KEY CHECK (id = 1),
                wallpaper_url   TEXT,
                retention_hours INTEGER NOT NULL DEFAULT 24 CHECK (retention_hours >= 1),
                updated_by      TEXT NOT NULL,
                updated_at      INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
