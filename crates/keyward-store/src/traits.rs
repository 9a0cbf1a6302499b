//! Store traits: the abstract interfaces for auth records and blobs.
//!
//! The auth store persists Access Objects and user records behind a
//! per-request transaction. The object store persists opaque blobs and has no
//! transactional semantics at all. Implementations include SQLite (durable)
//! and in-memory (for tests).

use async_trait::async_trait;
use bytes::Bytes;
use keyward_core::{ObjectId, UserId};

use crate::error::Result;

/// A persisted record: serialized bytes plus the MAC tag over them.
///
/// The store never interprets either field; verification belongs to the
/// authorizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub data: Vec<u8>,
    pub tag: Vec<u8>,
}

impl StoredRecord {
    pub fn new(data: impl Into<Vec<u8>>, tag: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            tag: tag.into(),
        }
    }
}

/// Factory for auth store transactions.
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Begin a unit of work scoped to one request.
    async fn begin_transaction(&self) -> Result<Box<dyn AuthStoreTx>>;
}

/// One auth store transaction.
///
/// # Contract
///
/// - **Atomic commit**: every write issued through the transaction becomes
///   visible at once on `commit`, or not at all.
/// - **Failed commit**: if `commit` returns an error, none of the writes are
///   observable afterwards.
/// - **Read your writes**: reads observe writes made earlier through the
///   same transaction.
/// - **Drop is rollback**: a transaction dropped without `commit` discards
///   its writes.
/// - **Backend isolation**: concurrent transactions are ordered only as far as
///   the backend orders them. SQLite admits one transaction at a time, so
///   read-modify-write sequences serialize. The memory store buffers writes
///   and lets updates of a live record race, with the later commit winning;
///   a commit whose update or delete targets a record that a concurrent
///   commit removed fails with `CommitFailed` instead of resurrecting it.
/// - **One per task**: a task must not hold two transactions on the same
///   store at once; on SQLite the second `begin_transaction` waits for the
///   first to finish.
#[async_trait]
pub trait AuthStoreTx: Send {
    // ─────────────────────────────────────────────────────────────────────────
    // Access Objects
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new Access Object.
    ///
    /// # Returns
    /// - `AlreadyExists` if a record with this id is visible to the transaction.
    async fn insert_access_object(
        &mut self,
        object_id: &ObjectId,
        data: &[u8],
        tag: &[u8],
    ) -> Result<()>;

    /// Get the Access Object record for an object, if any.
    async fn get_access_object(&mut self, object_id: &ObjectId) -> Result<Option<StoredRecord>>;

    /// Replace an existing Access Object.
    ///
    /// # Returns
    /// - `NotFound` if no record with this id is visible to the transaction.
    async fn update_access_object(
        &mut self,
        object_id: &ObjectId,
        data: &[u8],
        tag: &[u8],
    ) -> Result<()>;

    /// Delete an Access Object. `NotFound` if absent.
    async fn delete_access_object(&mut self, object_id: &ObjectId) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a user record. `AlreadyExists` if the id is taken.
    async fn insert_user(&mut self, user_id: &UserId, data: &[u8], tag: &[u8]) -> Result<()>;

    /// Get a user record, if any.
    async fn get_user(&mut self, user_id: &UserId) -> Result<Option<StoredRecord>>;

    /// Delete a user record. `NotFound` if absent.
    async fn delete_user(&mut self, user_id: &UserId) -> Result<()>;

    /// Whether a user record exists.
    async fn user_exists(&mut self, user_id: &UserId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Make every write visible atomically.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every write.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Blob storage addressed by string keys.
///
/// Writes take effect immediately; there is no transaction to roll back.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous value.
    async fn store(&self, key: &str, data: Bytes) -> Result<()>;

    /// Retrieve the blob under `key`.
    ///
    /// # Returns
    /// - `NotFound` if nothing is stored under `key`.
    async fn retrieve(&self, key: &str) -> Result<Bytes>;

    /// Delete the blob under `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
