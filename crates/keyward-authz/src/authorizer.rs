//! The Authorizer: creates, fetches, verifies and rewrites Access Objects.
//!
//! Every Access Object is stored as `(bytes, tag)` where the tag is the
//! access-objects-domain MAC over `object_id || bytes`. The authorizer is the
//! only component that produces or checks those tags, and the only one that
//! looks inside a decoded record.
//!
//! All operations run inside the caller's auth store transaction; none of
//! them commit.

use keyward_core::{
    AccessObject, KeyConfig, MacDomain, MessageAuthenticator, ObjectId, Tag, UserId, WrappedKey,
};
use keyward_store::{AuthStoreTx, StoreError, StoredRecord};

use crate::error::{AuthzError, Result};

/// Creates and verifies MAC-protected Access Objects.
#[derive(Debug)]
pub struct Authorizer {
    mac: MessageAuthenticator,
}

impl Authorizer {
    /// Create an authorizer keyed by the master authorization key.
    pub fn new(keys: &KeyConfig) -> Self {
        Self {
            mac: keys.authenticator(MacDomain::AccessObjects),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Record Encoding
    // ─────────────────────────────────────────────────────────────────────────

    /// Serialize a record and tag it against `object_id`.
    pub fn seal(&self, object_id: &ObjectId, access_object: &AccessObject) -> Result<(Vec<u8>, Tag)> {
        let data = access_object.to_bytes()?;
        let tag = self.mac.tag(object_id.as_bytes(), &data);
        Ok((data, tag))
    }

    /// Verify a stored record against `object_id` and decode it.
    ///
    /// # Returns
    /// - `Integrity` if the tag does not verify, or if the bytes do not
    ///   decode even though the tag does.
    pub fn open(&self, object_id: &ObjectId, record: &StoredRecord) -> Result<AccessObject> {
        if !self.mac.verify(object_id.as_bytes(), &record.data, &record.tag) {
            return Err(AuthzError::integrity(object_id, "tag verification failed"));
        }
        AccessObject::from_bytes(&record.data)
            .map_err(|e| AuthzError::integrity(object_id, e.to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Store Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create the Access Object for a new object with `creator` as its only
    /// member.
    pub async fn create_access_object(
        &self,
        tx: &mut dyn AuthStoreTx,
        object_id: &ObjectId,
        creator: UserId,
        wrapped_key: WrappedKey,
    ) -> Result<AccessObject> {
        let access_object = AccessObject::new(creator, wrapped_key);
        let (data, tag) = self.seal(object_id, &access_object)?;
        tx.insert_access_object(object_id, &data, tag.as_bytes()).await?;
        tracing::debug!(%object_id, user_id = %creator, "access object created");
        Ok(access_object)
    }

    /// Fetch and verify the Access Object for `object_id`.
    ///
    /// # Returns
    /// - `NotFound` if no record exists.
    /// - `Integrity` if the record was tampered with or belongs to another id.
    pub async fn fetch_access_object(
        &self,
        tx: &mut dyn AuthStoreTx,
        object_id: &ObjectId,
    ) -> Result<AccessObject> {
        let record = tx
            .get_access_object(object_id)
            .await?
            .ok_or(AuthzError::NotFound(*object_id))?;
        self.open(object_id, &record)
    }

    /// Rewrite an Access Object: bump its version, re-serialize, re-tag and
    /// replace the stored record.
    pub async fn upsert_access_object(
        &self,
        tx: &mut dyn AuthStoreTx,
        object_id: &ObjectId,
        access_object: &mut AccessObject,
    ) -> Result<()> {
        access_object.increment_version();
        let (data, tag) = self.seal(object_id, access_object)?;
        tx.update_access_object(object_id, &data, tag.as_bytes())
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => AuthzError::NotFound(*object_id),
                other => AuthzError::Store(other),
            })
    }

    /// Delete the Access Object for `object_id`.
    pub async fn delete_access_object(
        &self,
        tx: &mut dyn AuthStoreTx,
        object_id: &ObjectId,
    ) -> Result<()> {
        tx.delete_access_object(object_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => AuthzError::NotFound(*object_id),
                other => AuthzError::Store(other),
            })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Membership
    // ─────────────────────────────────────────────────────────────────────────

    /// Add `user` and write the record back. Idempotent.
    pub async fn add_permission(
        &self,
        tx: &mut dyn AuthStoreTx,
        object_id: &ObjectId,
        access_object: &mut AccessObject,
        user: UserId,
    ) -> Result<()> {
        access_object.add_user(user);
        self.upsert_access_object(tx, object_id, access_object).await
    }

    /// Remove `user` and write the record back. Idempotent; removing the last
    /// member seals the object.
    pub async fn remove_permission(
        &self,
        tx: &mut dyn AuthStoreTx,
        object_id: &ObjectId,
        access_object: &mut AccessObject,
        user: &UserId,
    ) -> Result<()> {
        access_object.remove_user(user);
        self.upsert_access_object(tx, object_id, access_object).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_store::{AuthStore, MemoryAuthStore};

    fn setup() -> (Authorizer, MemoryAuthStore) {
        (Authorizer::new(&KeyConfig::generate()), MemoryAuthStore::new())
    }

    fn wrapped() -> WrappedKey {
        WrappedKey::from_bytes(vec![0xaa; 60])
    }

    #[tokio::test]
    async fn test_create_then_fetch() {
        let (authz, store) = setup();
        let oid = ObjectId::generate();
        let creator = UserId::generate();

        let mut tx = store.begin_transaction().await.unwrap();
        authz
            .create_access_object(tx.as_mut(), &oid, creator, wrapped())
            .await
            .unwrap();

        // Visible in the same transaction before commit.
        let ao = authz.fetch_access_object(tx.as_mut(), &oid).await.unwrap();
        assert!(ao.contains_user(&creator));
        assert_eq!(ao.users().len(), 1);
        assert_eq!(ao.wrapped_key(), &wrapped());
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let (authz, store) = setup();
        let mut tx = store.begin_transaction().await.unwrap();

        let err = authz
            .fetch_access_object(tx.as_mut(), &ObjectId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_create_is_store_error() {
        let (authz, store) = setup();
        let oid = ObjectId::generate();
        let mut tx = store.begin_transaction().await.unwrap();

        authz
            .create_access_object(tx.as_mut(), &oid, UserId::generate(), wrapped())
            .await
            .unwrap();
        let err = authz
            .create_access_object(tx.as_mut(), &oid, UserId::generate(), wrapped())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::Store(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_tampered_data_fails_integrity() {
        let (authz, store) = setup();
        let oid = ObjectId::generate();
        let mut tx = store.begin_transaction().await.unwrap();
        authz
            .create_access_object(tx.as_mut(), &oid, UserId::generate(), wrapped())
            .await
            .unwrap();

        let mut record = tx.get_access_object(&oid).await.unwrap().unwrap();
        for i in 0..record.data.len() {
            for bit in 0..8 {
                record.data[i] ^= 1 << bit;
                assert!(matches!(
                    authz.open(&oid, &record),
                    Err(AuthzError::Integrity { .. })
                ));
                record.data[i] ^= 1 << bit;
            }
        }
        assert!(authz.open(&oid, &record).is_ok());
    }

    #[tokio::test]
    async fn test_tampered_tag_fails_integrity() {
        let (authz, store) = setup();
        let oid = ObjectId::generate();
        let mut tx = store.begin_transaction().await.unwrap();
        authz
            .create_access_object(tx.as_mut(), &oid, UserId::generate(), wrapped())
            .await
            .unwrap();

        let mut record = tx.get_access_object(&oid).await.unwrap().unwrap();
        record.tag[0] ^= 0x80;
        tx.update_access_object(&oid, &record.data, &record.tag)
            .await
            .unwrap();

        let err = authz.fetch_access_object(tx.as_mut(), &oid).await.unwrap_err();
        assert!(matches!(err, AuthzError::Integrity { .. }));
    }

    #[tokio::test]
    async fn test_record_bound_to_object_id() {
        let (authz, store) = setup();
        let original = ObjectId::generate();
        let other = ObjectId::generate();
        let mut tx = store.begin_transaction().await.unwrap();
        authz
            .create_access_object(tx.as_mut(), &original, UserId::generate(), wrapped())
            .await
            .unwrap();

        let record = tx.get_access_object(&original).await.unwrap().unwrap();
        tx.insert_access_object(&other, &record.data, &record.tag)
            .await
            .unwrap();

        let err = authz.fetch_access_object(tx.as_mut(), &other).await.unwrap_err();
        assert!(matches!(err, AuthzError::Integrity { .. }));
    }

    #[tokio::test]
    async fn test_upsert_bumps_version() {
        let (authz, store) = setup();
        let oid = ObjectId::generate();
        let mut tx = store.begin_transaction().await.unwrap();
        let mut ao = authz
            .create_access_object(tx.as_mut(), &oid, UserId::generate(), wrapped())
            .await
            .unwrap();

        authz
            .add_permission(tx.as_mut(), &oid, &mut ao, UserId::generate())
            .await
            .unwrap();
        authz
            .add_permission(tx.as_mut(), &oid, &mut ao, UserId::generate())
            .await
            .unwrap();

        let fetched = authz.fetch_access_object(tx.as_mut(), &oid).await.unwrap();
        assert_eq!(fetched.version(), 2);
        assert_eq!(fetched.users().len(), 3);
    }

    #[tokio::test]
    async fn test_remove_last_member_seals() {
        let (authz, store) = setup();
        let oid = ObjectId::generate();
        let creator = UserId::generate();
        let mut tx = store.begin_transaction().await.unwrap();
        let mut ao = authz
            .create_access_object(tx.as_mut(), &oid, creator, wrapped())
            .await
            .unwrap();

        authz
            .remove_permission(tx.as_mut(), &oid, &mut ao, &creator)
            .await
            .unwrap();

        let fetched = authz.fetch_access_object(tx.as_mut(), &oid).await.unwrap();
        assert!(fetched.is_sealed());
        assert!(!fetched.contains_user(&creator));
    }

    #[tokio::test]
    async fn test_delete_then_fetch() {
        let (authz, store) = setup();
        let oid = ObjectId::generate();
        let mut tx = store.begin_transaction().await.unwrap();
        authz
            .create_access_object(tx.as_mut(), &oid, UserId::generate(), wrapped())
            .await
            .unwrap();

        authz.delete_access_object(tx.as_mut(), &oid).await.unwrap();
        assert!(matches!(
            authz.fetch_access_object(tx.as_mut(), &oid).await,
            Err(AuthzError::NotFound(_))
        ));
        assert!(matches!(
            authz.delete_access_object(tx.as_mut(), &oid).await,
            Err(AuthzError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_other_ask_cannot_verify() {
        let (authz, store) = setup();
        let other = Authorizer::new(&KeyConfig::generate());
        let oid = ObjectId::generate();
        let mut tx = store.begin_transaction().await.unwrap();
        authz
            .create_access_object(tx.as_mut(), &oid, UserId::generate(), wrapped())
            .await
            .unwrap();

        assert!(matches!(
            other.fetch_access_object(tx.as_mut(), &oid).await,
            Err(AuthzError::Integrity { .. })
        ));
    }
}
