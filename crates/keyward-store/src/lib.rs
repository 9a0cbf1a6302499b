//! # Keyward Store
//!
//! Storage abstraction for Keyward. Provides trait-based interfaces for the
//! transactional auth store and the blob object store, with SQLite and
//! in-memory implementations of each.
//!
//! ## Key Types
//!
//! - [`AuthStore`] / [`AuthStoreTx`] - Per-request transactions over Access
//!   Objects and user records
//! - [`ObjectStore`] - Non-transactional blob storage
//! - [`SqliteAuthStore`], [`SqliteObjectStore`] - Durable backends
//! - [`MemoryAuthStore`], [`MemoryObjectStore`] - In-memory backends for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyward_core::ObjectId;
//! use keyward_store::{AuthStore, SqliteAuthStore};
//!
//! async fn example() {
//!     let store = SqliteAuthStore::open("auth.db").unwrap();
//!
//!     let mut tx = store.begin_transaction().await.unwrap();
//!     tx.insert_access_object(&ObjectId::generate(), b"record", b"tag")
//!         .await
//!         .unwrap();
//!     tx.commit().await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Opaque records**: stores keep `(data, tag)` pairs and never verify tags
//! - **Atomic commit**: a failed commit leaves no write observable
//! - **Backend isolation**: SQLite runs one transaction at a time; the memory
//!   store lets updates race (last commit wins) but fails a commit whose
//!   update or delete targets a row deleted in the meantime

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::{MemoryAuthStore, MemoryObjectStore};
pub use sqlite::{SqliteAuthStore, SqliteObjectStore};
pub use traits::{AuthStore, AuthStoreTx, ObjectStore, StoredRecord};
