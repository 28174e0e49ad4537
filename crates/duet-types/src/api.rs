use serde::{Deserialize, Serialize};

use crate::models::{Media, Message};

// -- Messages --

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub text: Option<String>,
    pub media: Option<Media>,
}

impl SendMessageRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            media: None,
        }
    }

    pub fn media(media: Media, caption: Option<String>) -> Self {
        Self {
            text: caption,
            media: Some(media),
        }
    }
}

// -- Settings --

/// Raw admin form input. Retention hours arrive as text and are validated
/// before anything is persisted.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveSettingsRequest {
    pub wallpaper_url: String,
    pub retention_hours: String,
}

// -- Rendering --

/// What one viewer sees of a conversation right now.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderedThread {
    pub messages: Vec<Message>,
    pub wallpaper_url: Option<String>,
}
