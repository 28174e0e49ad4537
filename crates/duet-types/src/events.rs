use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ConversationKey;

/// Change notifications fanned out to live subscriptions after a write lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StoreEvent {
    /// A message was appended to a conversation log
    MessageCreated {
        conversation: ConversationKey,
        message_id: Uuid,
    },

    /// Seen, saved or the deletion set of a message changed
    MessageUpdated {
        conversation: ConversationKey,
        message_id: Uuid,
    },

    /// A message record was removed (delete for everyone, or retention)
    MessageDeleted {
        conversation: ConversationKey,
        message_id: Uuid,
    },

    /// The global settings record was written
    SettingsUpdated,
}

impl StoreEvent {
    /// Returns the conversation if this event is scoped to one.
    /// Events that return `None` are global.
    pub fn conversation(&self) -> Option<&ConversationKey> {
        match self {
            Self::MessageCreated { conversation, .. } => Some(conversation),
            Self::MessageUpdated { conversation, .. } => Some(conversation),
            Self::MessageDeleted { conversation, .. } => Some(conversation),
            Self::SettingsUpdated => None,
        }
    }

    pub fn touches_settings(&self) -> bool {
        matches!(self, Self::SettingsUpdated)
    }
}
