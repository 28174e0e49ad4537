//! Database row types. These map directly to SQLite rows and stay
//! separate from the duet-types models.
//! Timestamps are milliseconds since the Unix epoch.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub role: String,
    pub created_at: i64,
}

pub struct MessageRow {
    pub id: String,
    pub conversation: String,
    pub author_id: String,
    pub body: Option<String>,
    pub media_url: Option<String>,
    pub media_kind: Option<String>,
    pub seen: bool,
    pub saved: bool,
    pub created_at: i64,
}

pub struct HiddenRow {
    pub message_id: String,
    pub viewer_id: String,
}

pub struct SettingsRow {
    pub wallpaper_url: Option<String>,
    pub retention_hours: i64,
    pub updated_by: String,
    pub updated_at: i64,
}
