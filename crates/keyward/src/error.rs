//! Error types for the service, and the client-facing status they map to.

use std::fmt;

use keyward_authz::AuthzError;
use keyward_core::{CoreError, CryptoError};
use keyward_store::StoreError;
use thiserror::Error;

use crate::authn::AuthError;

/// Errors that can occur while serving a request.
///
/// The detail carried by each variant is for logs only; clients see a
/// [`Status`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The credential is missing or does not verify.
    #[error("unauthenticated: {0}")]
    Unauthenticated(#[from] AuthError),

    /// The caller lacks the method's scope or is not a member of the
    /// object's Access Object.
    #[error("permission denied")]
    PermissionDenied,

    /// The object (or one of its blobs) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request is malformed or names a target that does not exist.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A stored record failed verification.
    #[error("integrity failure: {0}")]
    Integrity(String),

    /// Encryption or decryption failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A store operation failed.
    #[error("storage error: {0}")]
    Storage(StoreError),

    /// Anything else, including recovered panics.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Map to the client-facing status.
    pub fn status(&self) -> Status {
        let code = match self {
            ServiceError::Unauthenticated(_) => StatusCode::Unauthenticated,
            ServiceError::PermissionDenied => StatusCode::PermissionDenied,
            ServiceError::NotFound(_) => StatusCode::NotFound,
            ServiceError::InvalidArgument(_) => StatusCode::InvalidArgument,
            ServiceError::Integrity(_)
            | ServiceError::Crypto(_)
            | ServiceError::Storage(_)
            | ServiceError::Internal(_) => StatusCode::Internal,
        };
        Status::new(code)
    }

    /// Whether the caller caused this error.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Unauthenticated(_)
                | ServiceError::PermissionDenied
                | ServiceError::NotFound(_)
                | ServiceError::InvalidArgument(_)
        )
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            other => ServiceError::Storage(other),
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(e: AuthzError) -> Self {
        match e {
            AuthzError::NotFound(object_id) => ServiceError::NotFound(object_id.to_string()),
            AuthzError::UserNotFound(user_id) => ServiceError::NotFound(user_id.to_string()),
            e @ AuthzError::Integrity { .. } => ServiceError::Integrity(e.to_string()),
            AuthzError::Encoding(e) => ServiceError::Internal(e.to_string()),
            AuthzError::Store(e) => e.into(),
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Crypto(e) => ServiceError::Crypto(e),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

// ─────────────────────────────────────────────────────────────────────────────
// Client Status
// ─────────────────────────────────────────────────────────────────────────────

/// Status codes a client can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Unauthenticated,
    PermissionDenied,
    NotFound,
    InvalidArgument,
    Internal,
}

impl StatusCode {
    /// The fixed message sent with this code.
    pub const fn message(&self) -> &'static str {
        match self {
            StatusCode::Unauthenticated => "unauthenticated",
            StatusCode::PermissionDenied => "permission denied",
            StatusCode::NotFound => "not found",
            StatusCode::InvalidArgument => "invalid argument",
            StatusCode::Internal => "internal error",
        }
    }
}

/// A client-facing failure. Carries no detail beyond its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    code: StatusCode,
}

impl Status {
    pub const fn new(code: StatusCode) -> Self {
        Self { code }
    }

    pub const fn internal() -> Self {
        Self::new(StatusCode::Internal)
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &'static str {
        self.code.message()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message())
    }
}

impl std::error::Error for Status {}

impl From<ServiceError> for Status {
    fn from(e: ServiceError) -> Self {
        e.status()
    }
}
