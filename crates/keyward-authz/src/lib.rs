//! # Keyward Authz
//!
//! The authorization layer: MAC-protected Access Objects and user records.
//!
//! ## Overview
//!
//! Every encrypted object has exactly one Access Object in the auth store.
//! It lists the users allowed to act on the object and carries the object's
//! wrapped key. The stored bytes are tagged with a keyed BLAKE3 MAC under the
//! master authorization key, with the object id as context. Anyone who can
//! write to the auth store but does not hold that key cannot forge a record,
//! alter one, or move one onto another object.
//!
//! ## Key Types
//!
//! - [`Authorizer`] - Create, fetch, verify, rewrite and delete Access Objects
//! - [`UserRegistry`] - Register users and check that a user exists
//! - [`AuthzError`] - `NotFound`, `Integrity`, and store/encoding failures
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyward_authz::Authorizer;
//! use keyward_core::{KeyConfig, ObjectId, UserId, WrappedKey};
//! use keyward_store::{AuthStore, MemoryAuthStore};
//!
//! async fn example() {
//!     let keys = KeyConfig::generate();
//!     let authz = Authorizer::new(&keys);
//!     let store = MemoryAuthStore::new();
//!
//!     let object_id = ObjectId::generate();
//!     let mut tx = store.begin_transaction().await.unwrap();
//!     authz
//!         .create_access_object(tx.as_mut(), &object_id, UserId::generate(), WrappedKey::from_bytes(vec![0; 60]))
//!         .await
//!         .unwrap();
//!     tx.commit().await.unwrap();
//! }
//! ```

pub mod authorizer;
pub mod error;
pub mod users;

pub use authorizer::Authorizer;
pub use error::{AuthzError, Result};
pub use users::UserRegistry;
