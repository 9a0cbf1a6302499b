//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use keyward::{Credential, Service, TokenAuthenticator};
use keyward_core::{KeyConfig, ObjectId, ScopeSet, UserId};
use keyward_store::{
    AuthStore, AuthStoreTx, MemoryAuthStore, MemoryObjectStore, ObjectStore, SqliteAuthStore,
    SqliteObjectStore, StoreError, StoredRecord,
};

/// A registered user and a valid credential for them.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: UserId,
    pub credential: Credential,
}

/// A service wired to inspectable stores, plus a token issuer for its TEK.
pub struct TestFixture {
    pub keys: Arc<KeyConfig>,
    pub auth_store: Arc<dyn AuthStore>,
    pub object_store: Arc<dyn ObjectStore>,
    pub tokens: Arc<TokenAuthenticator>,
    pub service: Service,
}

impl TestFixture {
    /// In-memory stores and random keys.
    pub fn new() -> Self {
        Self::with_stores(
            Arc::new(MemoryAuthStore::new()),
            Arc::new(MemoryObjectStore::new()),
        )
    }

    /// SQLite stores in `dir`.
    pub fn sqlite(dir: &Path) -> Result<Self, StoreError> {
        Ok(Self::with_stores(
            Arc::new(SqliteAuthStore::open(dir.join("auth.db"))?),
            Arc::new(SqliteObjectStore::open(dir.join("objects.db"))?),
        ))
    }

    /// Caller-supplied stores and random keys.
    pub fn with_stores(auth_store: Arc<dyn AuthStore>, object_store: Arc<dyn ObjectStore>) -> Self {
        let keys = Arc::new(KeyConfig::generate());
        let tokens = Arc::new(TokenAuthenticator::new(&keys));
        let service = Service::new(
            keys.clone(),
            auth_store.clone(),
            object_store.clone(),
            tokens.clone(),
        );
        Self {
            keys,
            auth_store,
            object_store,
            tokens,
            service,
        }
    }

    /// Register a user holding every scope and issue them a token.
    pub async fn user(&self) -> TestUser {
        self.user_with_scopes(ScopeSet::all()).await
    }

    /// Register a user holding only `scopes`.
    pub async fn user_with_scopes(&self, scopes: ScopeSet) -> TestUser {
        let id = self
            .service
            .provision_user(scopes)
            .await
            .expect("provision user");
        TestUser {
            id,
            credential: self.credential_for(&id),
        }
    }

    /// Register `count` users.
    pub async fn users(&self, count: usize) -> Vec<TestUser> {
        let mut users = Vec::with_capacity(count);
        for _ in 0..count {
            users.push(self.user().await);
        }
        users
    }

    /// A valid token for `user_id`, whether or not the user is registered.
    pub fn credential_for(&self, user_id: &UserId) -> Credential {
        Credential::bearer(self.tokens.issue(user_id))
    }

    /// The committed Access Object record for `object_id`, read through a
    /// throwaway transaction.
    pub async fn raw_access_object(&self, object_id: &ObjectId) -> Option<StoredRecord> {
        let mut tx = self.auth_store.begin_transaction().await.expect("begin");
        let record = tx.get_access_object(object_id).await.expect("get");
        tx.rollback().await.expect("rollback");
        record
    }

    /// Overwrite the committed Access Object record for `object_id`.
    pub async fn write_raw_access_object(&self, object_id: &ObjectId, record: &StoredRecord) {
        let mut tx = self.auth_store.begin_transaction().await.expect("begin");
        if tx.get_access_object(object_id).await.expect("get").is_some() {
            tx.update_access_object(object_id, &record.data, &record.tag)
                .await
                .expect("update");
        } else {
            tx.insert_access_object(object_id, &record.data, &record.tag)
                .await
                .expect("insert");
        }
        tx.commit().await.expect("commit");
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fault Injection
// ─────────────────────────────────────────────────────────────────────────────

/// Wraps an auth store and fails every commit while `fail_commits` is set.
///
/// A failed commit rolls the inner transaction back, so none of its writes
/// become visible.
#[derive(Clone)]
pub struct FaultyAuthStore {
    inner: Arc<dyn AuthStore>,
    fail_commits: Arc<AtomicBool>,
}

impl FaultyAuthStore {
    pub fn new(inner: Arc<dyn AuthStore>) -> Self {
        Self {
            inner,
            fail_commits: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuthStore for FaultyAuthStore {
    async fn begin_transaction(&self) -> keyward_store::Result<Box<dyn AuthStoreTx>> {
        Ok(Box::new(FaultyTx {
            inner: self.inner.begin_transaction().await?,
            fail_commits: self.fail_commits.clone(),
        }))
    }
}

struct FaultyTx {
    inner: Box<dyn AuthStoreTx>,
    fail_commits: Arc<AtomicBool>,
}

#[async_trait]
impl AuthStoreTx for FaultyTx {
    async fn insert_access_object(
        &mut self,
        object_id: &ObjectId,
        data: &[u8],
        tag: &[u8],
    ) -> keyward_store::Result<()> {
        self.inner.insert_access_object(object_id, data, tag).await
    }

    async fn get_access_object(
        &mut self,
        object_id: &ObjectId,
    ) -> keyward_store::Result<Option<StoredRecord>> {
        self.inner.get_access_object(object_id).await
    }

    async fn update_access_object(
        &mut self,
        object_id: &ObjectId,
        data: &[u8],
        tag: &[u8],
    ) -> keyward_store::Result<()> {
        self.inner.update_access_object(object_id, data, tag).await
    }

    async fn delete_access_object(&mut self, object_id: &ObjectId) -> keyward_store::Result<()> {
        self.inner.delete_access_object(object_id).await
    }

    async fn insert_user(
        &mut self,
        user_id: &UserId,
        data: &[u8],
        tag: &[u8],
    ) -> keyward_store::Result<()> {
        self.inner.insert_user(user_id, data, tag).await
    }

    async fn get_user(&mut self, user_id: &UserId) -> keyward_store::Result<Option<StoredRecord>> {
        self.inner.get_user(user_id).await
    }

    async fn delete_user(&mut self, user_id: &UserId) -> keyward_store::Result<()> {
        self.inner.delete_user(user_id).await
    }

    async fn user_exists(&mut self, user_id: &UserId) -> keyward_store::Result<bool> {
        self.inner.user_exists(user_id).await
    }

    async fn commit(self: Box<Self>) -> keyward_store::Result<()> {
        let this = *self;
        if this.fail_commits.load(Ordering::SeqCst) {
            this.inner.rollback().await?;
            return Err(StoreError::CommitFailed("injected commit failure".into()));
        }
        this.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> keyward_store::Result<()> {
        let this = *self;
        this.inner.rollback().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_users_are_distinct() {
        let fixture = TestFixture::new();
        let users = fixture.users(3).await;

        assert_ne!(users[0].id, users[1].id);
        assert_ne!(users[1].id, users[2].id);
        assert_ne!(users[0].id, users[2].id);
    }

    #[tokio::test]
    async fn test_faulty_store_discards_failed_commit() {
        let memory = MemoryAuthStore::new();
        let faulty = FaultyAuthStore::new(Arc::new(memory.clone()));
        let oid = ObjectId::generate();

        faulty.fail_commits(true);
        let mut tx = faulty.begin_transaction().await.unwrap();
        tx.insert_access_object(&oid, b"d", b"t").await.unwrap();
        assert!(matches!(
            tx.commit().await,
            Err(StoreError::CommitFailed(_))
        ));
        assert_eq!(memory.access_object_count().unwrap(), 0);

        faulty.fail_commits(false);
        let mut tx = faulty.begin_transaction().await.unwrap();
        tx.insert_access_object(&oid, b"d", b"t").await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(memory.access_object_count().unwrap(), 1);
    }
}
