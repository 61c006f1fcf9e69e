//! Error types for the store crate.

use thiserror::Error;

/// Errors that can occur in a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same message ID already exists.
    #[error("audit record for message {message_id} already exists")]
    Conflict { message_id: String },

    /// The transaction was already committed or rolled back.
    #[error("transaction already finished")]
    TransactionClosed,

    /// A queue receipt handle no longer matches the message.
    #[error("stale receipt handle for message {message_id}")]
    StaleReceipt { message_id: String },

    /// A cache row with the same position already exists.
    #[error("cache row {sort_index} already exists for entity {entity_id}")]
    DuplicateCacheRow { entity_id: String, sort_index: i32 },

    /// Failed to acquire an in-process lock.
    #[error("failed to acquire store lock")]
    LockError,

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether this is a unique-key conflict on the message ID.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Map a database error raised while inserting `message_id`, turning
    /// unique violations into [`StoreError::Conflict`].
    pub fn from_insert(err: sqlx::Error, message_id: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict {
                message_id: message_id.to_string(),
            },
            _ => Self::Database(err),
        }
    }
}
