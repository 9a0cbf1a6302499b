//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record or blob not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record with this key already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The transaction was already committed or rolled back.
    #[error("transaction already finished")]
    TransactionFinished,

    /// Commit failed; none of the transaction's writes are visible.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// A lock guarding backend state was poisoned by a panicking thread.
    #[error("lock poisoned: {0}")]
    Poisoned(String),

    /// A blocking task could not be joined.
    #[error("blocking task failed: {0}")]
    Task(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether this error means the addressed record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
