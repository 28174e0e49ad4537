use thiserror::Error;

/// A write was refused by a store-side access rule.
#[derive(Debug, Error)]
pub enum RuleViolation {
    #[error("user {actor} may not delete message {message_id} for everyone")]
    DeleteForEveryone { actor: String, message_id: String },

    #[error("user {actor} may not change global settings")]
    Settings { actor: String },
}

/// The addressed record does not exist (or is not in that conversation).
#[derive(Debug, Error)]
#[error("message {message_id} not found in conversation {conversation}")]
pub struct MissingRecord {
    pub conversation: String,
    pub message_id: String,
}
