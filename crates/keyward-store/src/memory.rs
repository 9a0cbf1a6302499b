//! In-memory implementations of the store traits.
//!
//! These are primarily for testing. They follow the same transaction
//! contract as SQLite but keep everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;
use keyward_core::{ObjectId, UserId};

use crate::error::{Result, StoreError};
use crate::traits::{AuthStore, AuthStoreTx, ObjectStore, StoredRecord};

/// Committed auth state.
#[derive(Default)]
struct Tables {
    access_objects: HashMap<ObjectId, StoredRecord>,
    users: HashMap<UserId, StoredRecord>,
}

fn read(lock: &RwLock<Tables>) -> Result<RwLockReadGuard<'_, Tables>> {
    lock.read().map_err(|e| StoreError::Poisoned(e.to_string()))
}

fn write(lock: &RwLock<Tables>) -> Result<RwLockWriteGuard<'_, Tables>> {
    lock.write().map_err(|e| StoreError::Poisoned(e.to_string()))
}

/// In-memory auth store.
///
/// Each transaction buffers its writes and applies them under a single
/// write lock on commit. All data is lost when the store is dropped.
#[derive(Clone, Default)]
pub struct MemoryAuthStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryAuthStore {
    /// Create a new empty in-memory auth store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed Access Objects.
    pub fn access_object_count(&self) -> Result<usize> {
        Ok(read(&self.tables)?.access_objects.len())
    }
}

#[async_trait]
impl AuthStore for MemoryAuthStore {
    async fn begin_transaction(&self) -> Result<Box<dyn AuthStoreTx>> {
        Ok(Box::new(MemoryAuthTx {
            tables: Arc::clone(&self.tables),
            access_objects: Overlay::new(),
            users: Overlay::new(),
        }))
    }
}

/// A buffered write, remembering whether it expects the committed row to
/// exist.
#[derive(Debug, Clone)]
enum Pending {
    /// The row did not exist when the transaction wrote it.
    Insert(StoredRecord),
    /// The row existed when the transaction wrote it.
    Update(StoredRecord),
    Delete,
}

impl Pending {
    fn visible(&self) -> Option<StoredRecord> {
        match self {
            Pending::Insert(record) | Pending::Update(record) => Some(record.clone()),
            Pending::Delete => None,
        }
    }

    /// A write replacing `self` in the same transaction. `None` means the
    /// writes cancel out.
    fn then(self, next: Pending) -> Option<Pending> {
        match (self, next) {
            (Pending::Insert(_), Pending::Delete) => None,
            (Pending::Insert(_), Pending::Update(record)) => Some(Pending::Insert(record)),
            (Pending::Delete, Pending::Insert(record)) => Some(Pending::Update(record)),
            (_, next) => Some(next),
        }
    }
}

/// Buffered writes for one table.
struct Overlay<K>(HashMap<K, Pending>);

impl<K: std::hash::Hash + Eq + Copy + std::fmt::Display> Overlay<K> {
    fn new() -> Self {
        Self(HashMap::new())
    }

    fn lookup(&self, key: &K) -> Option<Option<StoredRecord>> {
        self.0.get(key).map(Pending::visible)
    }

    fn record(&mut self, key: K, write: Pending) {
        let merged = match self.0.remove(&key) {
            Some(earlier) => earlier.then(write),
            None => Some(write),
        };
        if let Some(merged) = merged {
            self.0.insert(key, merged);
        }
    }

    /// Check every buffered write against the committed rows.
    ///
    /// A delete that committed after this transaction read a row makes its
    /// update or delete stale; applying it anyway would resurrect the row.
    fn validate(&self, committed: &HashMap<K, StoredRecord>) -> Result<()> {
        for (key, pending) in &self.0 {
            let present = committed.contains_key(key);
            match pending {
                Pending::Insert(_) if present => {
                    return Err(StoreError::CommitFailed(format!(
                        "{key} was inserted by a concurrent transaction"
                    )));
                }
                Pending::Update(_) | Pending::Delete if !present => {
                    return Err(StoreError::CommitFailed(format!(
                        "{key} was deleted by a concurrent transaction"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(self, committed: &mut HashMap<K, StoredRecord>) {
        for (key, pending) in self.0 {
            match pending {
                Pending::Insert(record) | Pending::Update(record) => {
                    committed.insert(key, record);
                }
                Pending::Delete => {
                    committed.remove(&key);
                }
            }
        }
    }
}

/// A transaction on a [`MemoryAuthStore`].
///
/// Pending writes shadow committed state. Commit re-checks that every row an
/// update or delete was based on still exists, so a concurrent delete is
/// never undone; concurrent updates of a live row still race and the later
/// commit wins.
pub struct MemoryAuthTx {
    tables: Arc<RwLock<Tables>>,
    access_objects: Overlay<ObjectId>,
    users: Overlay<UserId>,
}

impl MemoryAuthTx {
    fn visible_access_object(&self, object_id: &ObjectId) -> Result<Option<StoredRecord>> {
        if let Some(pending) = self.access_objects.lookup(object_id) {
            return Ok(pending);
        }
        Ok(read(&self.tables)?.access_objects.get(object_id).cloned())
    }

    fn visible_user(&self, user_id: &UserId) -> Result<Option<StoredRecord>> {
        if let Some(pending) = self.users.lookup(user_id) {
            return Ok(pending);
        }
        Ok(read(&self.tables)?.users.get(user_id).cloned())
    }
}

#[async_trait]
impl AuthStoreTx for MemoryAuthTx {
    async fn insert_access_object(
        &mut self,
        object_id: &ObjectId,
        data: &[u8],
        tag: &[u8],
    ) -> Result<()> {
        if self.visible_access_object(object_id)?.is_some() {
            return Err(StoreError::AlreadyExists(object_id.to_string()));
        }
        self.access_objects
            .record(*object_id, Pending::Insert(StoredRecord::new(data, tag)));
        Ok(())
    }

    async fn get_access_object(&mut self, object_id: &ObjectId) -> Result<Option<StoredRecord>> {
        self.visible_access_object(object_id)
    }

    async fn update_access_object(
        &mut self,
        object_id: &ObjectId,
        data: &[u8],
        tag: &[u8],
    ) -> Result<()> {
        if self.visible_access_object(object_id)?.is_none() {
            return Err(StoreError::NotFound(object_id.to_string()));
        }
        self.access_objects
            .record(*object_id, Pending::Update(StoredRecord::new(data, tag)));
        Ok(())
    }

    async fn delete_access_object(&mut self, object_id: &ObjectId) -> Result<()> {
        if self.visible_access_object(object_id)?.is_none() {
            return Err(StoreError::NotFound(object_id.to_string()));
        }
        self.access_objects.record(*object_id, Pending::Delete);
        Ok(())
    }

    async fn insert_user(&mut self, user_id: &UserId, data: &[u8], tag: &[u8]) -> Result<()> {
        if self.visible_user(user_id)?.is_some() {
            return Err(StoreError::AlreadyExists(user_id.to_string()));
        }
        self.users
            .record(*user_id, Pending::Insert(StoredRecord::new(data, tag)));
        Ok(())
    }

    async fn get_user(&mut self, user_id: &UserId) -> Result<Option<StoredRecord>> {
        self.visible_user(user_id)
    }

    async fn delete_user(&mut self, user_id: &UserId) -> Result<()> {
        if self.visible_user(user_id)?.is_none() {
            return Err(StoreError::NotFound(user_id.to_string()));
        }
        self.users.record(*user_id, Pending::Delete);
        Ok(())
    }

    async fn user_exists(&mut self, user_id: &UserId) -> Result<bool> {
        Ok(self.visible_user(user_id)?.is_some())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryAuthTx {
            tables,
            access_objects,
            users,
        } = *self;

        let mut committed = write(&tables)?;
        access_objects.validate(&committed.access_objects)?;
        users.validate(&committed.users)?;

        access_objects.apply(&mut committed.access_objects);
        users.apply(&mut committed.users);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// In-memory object store.
#[derive(Default)]
pub struct MemoryObjectStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryObjectStore {
    /// Create a new empty in-memory object store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    /// Whether no blobs are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn store(&self, key: &str, data: Bytes) -> Result<()> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        blobs.insert(key.to_string(), data);
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Bytes> {
        let blobs = self
            .blobs
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        blobs.remove(key);
        Ok(())
    }
}
