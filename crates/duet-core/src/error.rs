use thiserror::Error;
use uuid::Uuid;

use duet_db::{MissingRecord, RuleViolation};

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The acting identity is not allowed to do this.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Input rejected before it reached the store.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("message {0} not found")]
    NotFound(String),

    /// Transient store failure (I/O, locking, constraint).
    #[error("store error: {0}")]
    Store(anyhow::Error),

    #[error("blocking task failed: {0}")]
    Runtime(#[from] tokio::task::JoinError),
}

impl CoreError {
    pub fn not_found(id: Uuid) -> Self {
        Self::NotFound(id.to_string())
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }
}

/// Store-side rule rejections keep their meaning; anything else is transient.
impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(rule) = err.downcast_ref::<RuleViolation>() {
            return Self::Forbidden(rule.to_string());
        }
        if let Some(missing) = err.downcast_ref::<MissingRecord>() {
            return Self::NotFound(missing.message_id.clone());
        }
        Self::Store(err)
    }
}
