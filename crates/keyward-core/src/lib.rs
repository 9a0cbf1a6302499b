//! # Keyward Core
//!
//! Pure primitives for Keyward: identifiers, envelope encryption,
//! domain-separated MACs and the Access Object model.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`ObjectId`], [`UserId`], [`RequestId`] - UUID newtypes
//! - [`Cryptor`] - Envelope encryption under the master data key
//! - [`MessageAuthenticator`] - Keyed MAC bound to a [`MacDomain`]
//! - [`AccessObject`] - The per-object authorization record
//! - [`ScopeSet`] - The methods a user may call at all
//! - [`KeyConfig`] - The process-wide master keys
//!
//! ## Usage
//!
//! ```rust
//! use keyward_core::{Cryptor, KeyConfig, MacDomain};
//!
//! let keys = KeyConfig::generate();
//! let cryptor = Cryptor::new(keys.kek());
//!
//! let (wrapped, ciphertext) = cryptor.encrypt(b"payload", b"header").unwrap();
//! let plaintext = cryptor.decrypt(&wrapped, &ciphertext, b"header").unwrap();
//! assert_eq!(plaintext, b"payload");
//!
//! let mac = keys.authenticator(MacDomain::AccessObjects);
//! let tag = mac.tag(b"id", b"record");
//! assert!(mac.verify(b"id", b"record", tag.as_bytes()));
//! ```

pub mod access;
pub mod config;
pub mod crypto;
pub mod error;
pub mod mac;
pub mod scope;
pub mod types;

pub use access::{AccessObject, UserRecord};
pub use config::KeyConfig;
pub use crypto::{Cryptor, SymmetricKey, WrappedKey};
pub use error::{CoreError, CryptoError, Result};
pub use mac::{MacDomain, MessageAuthenticator, Tag};
pub use scope::{Scope, ScopeSet};
pub use types::{ObjectId, RequestId, UserId, AAD_SUFFIX, DATA_SUFFIX};

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
