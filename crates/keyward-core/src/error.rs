//! Error types for Keyward core primitives.

use thiserror::Error;

/// Failures of the AEAD cryptor.
///
/// These are never retried: they mean the input was tampered with, the
/// wrong associated data was supplied, or the input is malformed.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    Encryption,

    #[error("authentication failed")]
    Authentication,

    #[error("malformed ciphertext: {0}")]
    Malformed(String),

    #[error("invalid key length: expected 32, got {0}")]
    InvalidKeyLength(usize),
}

/// Core errors for record encoding and key configuration.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("invalid key {name}: {reason}")]
    InvalidKey { name: &'static str, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
