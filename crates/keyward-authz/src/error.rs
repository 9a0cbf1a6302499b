//! Error types for the authorization module.

use keyward_core::{CoreError, ObjectId, UserId};
use keyward_store::StoreError;
use thiserror::Error;

/// Errors that can occur during authorization operations.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// No Access Object exists for this object.
    #[error("access object not found: {0}")]
    NotFound(ObjectId),

    /// No user record exists for this user.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// A stored record failed tag verification or could not be decoded
    /// after its tag verified.
    #[error("integrity failure for {subject}: {reason}")]
    Integrity { subject: String, reason: String },

    /// Record encoding failed.
    #[error("encoding error: {0}")]
    Encoding(#[from] CoreError),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl AuthzError {
    pub(crate) fn integrity(subject: impl ToString, reason: impl Into<String>) -> Self {
        AuthzError::Integrity {
            subject: subject.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for authorization operations.
pub type Result<T> = std::result::Result<T, AuthzError>;
