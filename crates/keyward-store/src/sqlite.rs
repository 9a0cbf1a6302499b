//! SQLite implementations of the store traits.
//!
//! These are the durable backends. They use rusqlite with bundled SQLite,
//! wrapped in async via `tokio::task::spawn_blocking`.
//!
//! Every auth transaction runs on its own connection and holds the store's
//! single write permit from `begin_transaction` until it commits, rolls back
//! or is dropped. Requests against one store therefore queue on an async
//! semaphore instead of failing with `SQLITE_BUSY` when two deferred
//! transactions both try to upgrade their read lock. `BEGIN IMMEDIATE` takes
//! the database write lock up front, so other processes sharing the file
//! wait in the busy handler rather than deadlocking. The in-memory variant
//! uses a named shared-cache database so those connections see the same data.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use keyward_core::{ObjectId, UserId};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{AuthStore, AuthStoreTx, ObjectStore, StoredRecord};

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the database lives.
#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    SharedMemory(String),
}

impl Location {
    fn shared_memory() -> Self {
        Location::SharedMemory(format!(
            "file:keyward-{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4()
        ))
    }

    fn connect(&self) -> Result<Connection> {
        let conn = match self {
            Location::File(path) => Connection::open(path)?,
            Location::SharedMemory(uri) => Connection::open_with_flags(
                uri,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?,
        };
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

/// Run a blocking closure against a mutex-guarded connection.
async fn run_blocking<F, T>(conn: &Arc<Mutex<Connection>>, f: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let conn = conn
            .lock()
            .map_err(|e| StoreError::Poisoned(format!("connection mutex: {}", e)))?;
        f(&conn)
    })
    .await
    .map_err(|e| StoreError::Task(e.to_string()))?
}

/// SQLite-backed auth store.
pub struct SqliteAuthStore {
    location: Location,
    /// One permit: at most one transaction is open at a time.
    writer: Arc<Semaphore>,
    /// Holds the schema connection open; for the shared in-memory database
    /// this is also what keeps the data alive.
    _anchor: Mutex<Connection>,
}

impl SqliteAuthStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_at(Location::File(path.as_ref().to_path_buf()))
    }

    /// Open a private in-memory database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        Self::open_at(Location::shared_memory())
    }

    fn open_at(location: Location) -> Result<Self> {
        let mut conn = location.connect()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            location,
            writer: Arc::new(Semaphore::new(1)),
            _anchor: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl AuthStore for SqliteAuthStore {
    async fn begin_transaction(&self) -> Result<Box<dyn AuthStoreTx>> {
        let permit = Arc::clone(&self.writer)
            .acquire_owned()
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?;

        let location = self.location.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = location.connect()?;
            conn.execute_batch("BEGIN IMMEDIATE")?;
            Ok(conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

        Ok(Box::new(SqliteAuthTx {
            conn: Arc::new(Mutex::new(conn)),
            _permit: permit,
        }))
    }
}

/// A transaction on a [`SqliteAuthStore`].
///
/// Owns a dedicated connection with an open `BEGIN IMMEDIATE`. Dropping it
/// closes the connection, which rolls back anything uncommitted, and then
/// releases the store's write permit.
pub struct SqliteAuthTx {
    conn: Arc<Mutex<Connection>>,
    // Declared after `conn` so the connection closes first.
    _permit: OwnedSemaphorePermit,
}

fn get_record(conn: &Connection, sql: &str, id: &[u8]) -> Result<Option<StoredRecord>> {
    let record = conn
        .query_row(sql, params![id], |row| {
            Ok(StoredRecord {
                data: row.get(0)?,
                tag: row.get(1)?,
            })
        })
        .optional()?;
    Ok(record)
}

#[async_trait]
impl AuthStoreTx for SqliteAuthTx {
    async fn insert_access_object(
        &mut self,
        object_id: &ObjectId,
        data: &[u8],
        tag: &[u8],
    ) -> Result<()> {
        let id = *object_id;
        let data = data.to_vec();
        let tag = tag.to_vec();

        run_blocking(&self.conn, move |conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM access_objects WHERE object_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Err(StoreError::AlreadyExists(id.to_string()));
            }

            conn.execute(
                "INSERT INTO access_objects (object_id, data, tag) VALUES (?1, ?2, ?3)",
                params![id.as_bytes().as_slice(), data, tag],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_access_object(&mut self, object_id: &ObjectId) -> Result<Option<StoredRecord>> {
        let id = *object_id;
        run_blocking(&self.conn, move |conn| {
            get_record(
                conn,
                "SELECT data, tag FROM access_objects WHERE object_id = ?1",
                id.as_bytes(),
            )
        })
        .await
    }

    async fn update_access_object(
        &mut self,
        object_id: &ObjectId,
        data: &[u8],
        tag: &[u8],
    ) -> Result<()> {
        let id = *object_id;
        let data = data.to_vec();
        let tag = tag.to_vec();

        run_blocking(&self.conn, move |conn| {
            let changed = conn.execute(
                "UPDATE access_objects SET data = ?2, tag = ?3 WHERE object_id = ?1",
                params![id.as_bytes().as_slice(), data, tag],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn delete_access_object(&mut self, object_id: &ObjectId) -> Result<()> {
        let id = *object_id;
        run_blocking(&self.conn, move |conn| {
            let changed = conn.execute(
                "DELETE FROM access_objects WHERE object_id = ?1",
                params![id.as_bytes().as_slice()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn insert_user(&mut self, user_id: &UserId, data: &[u8], tag: &[u8]) -> Result<()> {
        let id = *user_id;
        let data = data.to_vec();
        let tag = tag.to_vec();

        run_blocking(&self.conn, move |conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM users WHERE user_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Err(StoreError::AlreadyExists(id.to_string()));
            }

            conn.execute(
                "INSERT INTO users (user_id, data, tag) VALUES (?1, ?2, ?3)",
                params![id.as_bytes().as_slice(), data, tag],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_user(&mut self, user_id: &UserId) -> Result<Option<StoredRecord>> {
        let id = *user_id;
        run_blocking(&self.conn, move |conn| {
            get_record(conn, "SELECT data, tag FROM users WHERE user_id = ?1", id.as_bytes())
        })
        .await
    }

    async fn delete_user(&mut self, user_id: &UserId) -> Result<()> {
        let id = *user_id;
        run_blocking(&self.conn, move |conn| {
            let changed = conn.execute(
                "DELETE FROM users WHERE user_id = ?1",
                params![id.as_bytes().as_slice()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn user_exists(&mut self, user_id: &UserId) -> Result<bool> {
        let id = *user_id;
        run_blocking(&self.conn, move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM users WHERE user_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        run_blocking(&self.conn, |conn| {
            if let Err(e) = conn.execute_batch("COMMIT") {
                // A failed COMMIT can leave the transaction open; make sure
                // nothing survives it.
                if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                    tracing::debug!(error = %rollback_err, "rollback after failed commit");
                }
                return Err(StoreError::CommitFailed(e.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        run_blocking(&self.conn, |conn| {
            conn.execute_batch("ROLLBACK")?;
            Ok(())
        })
        .await
    }
}

/// SQLite-backed object store.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteObjectStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteObjectStore {
    /// Open a SQLite database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Location::File(path.as_ref().to_path_buf()).connect()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl ObjectStore for SqliteObjectStore {
    async fn store(&self, key: &str, data: Bytes) -> Result<()> {
        let key = key.to_string();
        run_blocking(&self.conn, move |conn| {
            conn.execute(
                "INSERT INTO blobs (key, data, stored_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET data = excluded.data, stored_at = excluded.stored_at",
                params![key, &data[..], keyward_core::now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn retrieve(&self, key: &str) -> Result<Bytes> {
        let key = key.to_string();
        run_blocking(&self.conn, move |conn| {
            let data: Option<Vec<u8>> = conn
                .query_row("SELECT data FROM blobs WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()?;
            data.map(Bytes::from).ok_or(StoreError::NotFound(key))
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        run_blocking(&self.conn, move |conn| {
            conn.execute("DELETE FROM blobs WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(b: u8) -> ObjectId {
        ObjectId::from_bytes([b; 16])
    }

    #[tokio::test]
    async fn test_insert_commit_get() {
        let store = SqliteAuthStore::open_memory().unwrap();

        let mut tx = store.begin_transaction().await.unwrap();
        tx.insert_access_object(&oid(1), b"data", b"tag").await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin_transaction().await.unwrap();
        let record = tx.get_access_object(&oid(1)).await.unwrap().unwrap();
        assert_eq!(record.data, b"data");
        assert_eq!(record.tag, b"tag");
    }

    #[tokio::test]
    async fn test_read_your_writes() {
        let store = SqliteAuthStore::open_memory().unwrap();
        let mut tx = store.begin_transaction().await.unwrap();

        tx.insert_access_object(&oid(1), b"v0", b"t").await.unwrap();
        tx.update_access_object(&oid(1), b"v1", b"t").await.unwrap();
        assert_eq!(
            tx.get_access_object(&oid(1)).await.unwrap().unwrap().data,
            b"v1"
        );
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = SqliteAuthStore::open_memory().unwrap();

        let mut tx = store.begin_transaction().await.unwrap();
        tx.insert_access_object(&oid(1), b"data", b"tag").await.unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin_transaction().await.unwrap();
        assert!(tx.get_access_object(&oid(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = SqliteAuthStore::open_memory().unwrap();

        let mut tx = store.begin_transaction().await.unwrap();
        tx.insert_user(&UserId::from_bytes([3; 16]), b"u", b"t").await.unwrap();
        drop(tx);

        let mut tx = store.begin_transaction().await.unwrap();
        assert!(!tx.user_exists(&UserId::from_bytes([3; 16])).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_and_missing() {
        let store = SqliteAuthStore::open_memory().unwrap();
        let mut tx = store.begin_transaction().await.unwrap();

        tx.insert_access_object(&oid(1), b"a", b"t").await.unwrap();
        assert!(matches!(
            tx.insert_access_object(&oid(1), b"b", b"t").await,
            Err(StoreError::AlreadyExists(_))
        ));
        assert!(tx
            .update_access_object(&oid(2), b"a", b"t")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(tx.delete_access_object(&oid(2)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_second_transaction_waits_for_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteAuthStore::open(dir.path().join("auth.db")).unwrap();

        let mut writer = store.begin_transaction().await.unwrap();
        writer.insert_access_object(&oid(1), b"data", b"tag").await.unwrap();

        let waiting =
            tokio::time::timeout(Duration::from_millis(50), store.begin_transaction()).await;
        assert!(waiting.is_err(), "a second transaction opened while the first was live");

        writer.commit().await.unwrap();

        let mut reader = store.begin_transaction().await.unwrap();
        assert!(reader.get_access_object(&oid(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_store() {
        let store = SqliteAuthStore::open_memory().unwrap();

        let tx = store.begin_transaction().await.unwrap();
        drop(tx);

        let next =
            tokio::time::timeout(Duration::from_secs(5), store.begin_transaction()).await;
        assert!(next.unwrap().is_ok());
    }

    /// Read-modify-write on one record from two concurrent transactions.
    /// Both must land: the second starts only after the first commits.
    async fn read_then_update(store: &SqliteAuthStore, suffix: &'static [u8]) -> Result<()> {
        let mut tx = store.begin_transaction().await?;
        let mut record = tx
            .get_access_object(&oid(1))
            .await?
            .ok_or_else(|| StoreError::NotFound("seed".into()))?;
        tokio::task::yield_now().await;
        record.data.extend_from_slice(suffix);
        tx.update_access_object(&oid(1), &record.data, &record.tag)
            .await?;
        tx.commit().await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_read_modify_write_serializes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteAuthStore::open(dir.path().join("auth.db")).unwrap();

        let mut tx = store.begin_transaction().await.unwrap();
        tx.insert_access_object(&oid(1), b"seed", b"tag").await.unwrap();
        tx.commit().await.unwrap();

        let (a, b) = tokio::join!(
            read_then_update(&store, b"+a"),
            read_then_update(&store, b"+b")
        );
        a.unwrap();
        b.unwrap();

        let mut tx = store.begin_transaction().await.unwrap();
        let data = tx.get_access_object(&oid(1)).await.unwrap().unwrap().data;
        assert_eq!(data.len(), b"seed+a+b".len());
        assert!(data.starts_with(b"seed"));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let store = SqliteAuthStore::open_memory().unwrap();
        let user = UserId::from_bytes([5; 16]);

        let mut tx = store.begin_transaction().await.unwrap();
        tx.insert_user(&user, b"u", b"t").await.unwrap();
        tx.delete_user(&user).await.unwrap();
        assert!(!tx.user_exists(&user).await.unwrap());
        assert!(tx.delete_user(&user).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.db");

        {
            let store = SqliteAuthStore::open(&path).unwrap();
            let mut tx = store.begin_transaction().await.unwrap();
            tx.insert_user(&UserId::from_bytes([4; 16]), b"u", b"t").await.unwrap();
            tx.commit().await.unwrap();
        }

        let store = SqliteAuthStore::open(&path).unwrap();
        let mut tx = store.begin_transaction().await.unwrap();
        assert!(tx.user_exists(&UserId::from_bytes([4; 16])).await.unwrap());
    }

    #[tokio::test]
    async fn test_object_store_overwrite_and_delete() {
        let store = SqliteObjectStore::open_memory().unwrap();

        store.store("k", Bytes::from_static(b"one")).await.unwrap();
        store.store("k", Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(store.retrieve("k").await.unwrap(), Bytes::from_static(b"two"));

        store.delete("k").await.unwrap();
        assert!(store.retrieve("k").await.unwrap_err().is_not_found());
    }
}
