//! User registry: tagged user records in the auth store.
//!
//! A user exists once its record is present. Records are tagged under the
//! users MAC domain with the user id as context, so a record copied onto
//! another id fails verification. The tag also covers the user's scopes, so
//! they cannot be widened in storage without the ASK.

use keyward_core::{
    now_millis, KeyConfig, MacDomain, MessageAuthenticator, ScopeSet, UserId, UserRecord,
};
use keyward_store::{AuthStoreTx, StoreError};

use crate::error::{AuthzError, Result};

/// Registers and looks up users.
#[derive(Debug)]
pub struct UserRegistry {
    mac: MessageAuthenticator,
}

impl UserRegistry {
    pub fn new(keys: &KeyConfig) -> Self {
        Self {
            mac: keys.authenticator(MacDomain::Users),
        }
    }

    /// Register a freshly generated user id holding `scopes`.
    pub async fn create_user(&self, tx: &mut dyn AuthStoreTx, scopes: ScopeSet) -> Result<UserId> {
        let user_id = UserId::generate();
        self.register_user(tx, user_id, scopes).await?;
        Ok(user_id)
    }

    /// Register a caller-chosen user id.
    ///
    /// # Returns
    /// - `Store(AlreadyExists)` if the id is taken.
    pub async fn register_user(
        &self,
        tx: &mut dyn AuthStoreTx,
        user_id: UserId,
        scopes: ScopeSet,
    ) -> Result<()> {
        let record = UserRecord::new(user_id, scopes, now_millis());
        let data = record.to_bytes()?;
        let tag = self.mac.tag(user_id.as_bytes(), &data);
        tx.insert_user(&user_id, &data, tag.as_bytes()).await?;
        tracing::debug!(%user_id, %scopes, "user registered");
        Ok(())
    }

    /// Delete a user record.
    ///
    /// Memberships in Access Objects are left in place; they become inert
    /// because the user can no longer authenticate or be granted access.
    ///
    /// # Returns
    /// - `UserNotFound` if no record exists.
    pub async fn remove_user(&self, tx: &mut dyn AuthStoreTx, user_id: &UserId) -> Result<()> {
        match tx.delete_user(user_id).await {
            Ok(()) => {
                tracing::debug!(%user_id, "user removed");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Err(AuthzError::UserNotFound(*user_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch and verify a user record.
    pub async fn fetch_user(&self, tx: &mut dyn AuthStoreTx, user_id: &UserId) -> Result<UserRecord> {
        let stored = tx
            .get_user(user_id)
            .await?
            .ok_or(AuthzError::UserNotFound(*user_id))?;

        if !self.mac.verify(user_id.as_bytes(), &stored.data, &stored.tag) {
            return Err(AuthzError::integrity(user_id, "tag verification failed"));
        }
        let record = UserRecord::from_bytes(&stored.data)
            .map_err(|e| AuthzError::integrity(user_id, e.to_string()))?;
        if record.user_id != *user_id {
            return Err(AuthzError::integrity(user_id, "record names another user"));
        }
        Ok(record)
    }

    /// Whether `user_id` is registered.
    pub async fn user_exists(&self, tx: &mut dyn AuthStoreTx, user_id: &UserId) -> Result<bool> {
        Ok(tx.user_exists(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::Scope;
    use keyward_store::{AuthStore, MemoryAuthStore};

    #[tokio::test]
    async fn test_create_and_fetch() {
        let registry = UserRegistry::new(&KeyConfig::generate());
        let store = MemoryAuthStore::new();
        let mut tx = store.begin_transaction().await.unwrap();

        let scopes = ScopeSet::empty().with(Scope::Read).with(Scope::Create);
        let user = registry.create_user(tx.as_mut(), scopes).await.unwrap();
        assert!(registry.user_exists(tx.as_mut(), &user).await.unwrap());

        let record = registry.fetch_user(tx.as_mut(), &user).await.unwrap();
        assert_eq!(record.user_id, user);
        assert_eq!(record.scopes, scopes);
    }

    #[tokio::test]
    async fn test_remove_user() {
        let registry = UserRegistry::new(&KeyConfig::generate());
        let store = MemoryAuthStore::new();
        let mut tx = store.begin_transaction().await.unwrap();

        let user = registry
            .create_user(tx.as_mut(), ScopeSet::all())
            .await
            .unwrap();
        registry.remove_user(tx.as_mut(), &user).await.unwrap();

        assert!(!registry.user_exists(tx.as_mut(), &user).await.unwrap());
        assert!(matches!(
            registry.remove_user(tx.as_mut(), &user).await,
            Err(AuthzError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_widened_scopes_fail_verification() {
        let registry = UserRegistry::new(&KeyConfig::generate());
        let store = MemoryAuthStore::new();
        let mut tx = store.begin_transaction().await.unwrap();

        let user = registry
            .create_user(tx.as_mut(), ScopeSet::empty().with(Scope::Read))
            .await
            .unwrap();
        let stored = tx.get_user(&user).await.unwrap().unwrap();
        let mut record = UserRecord::from_bytes(&stored.data).unwrap();
        record.scopes = ScopeSet::all();
        let forged = record.to_bytes().unwrap();

        tx.delete_user(&user).await.unwrap();
        tx.insert_user(&user, &forged, &stored.tag).await.unwrap();

        assert!(matches!(
            registry.fetch_user(tx.as_mut(), &user).await,
            Err(AuthzError::Integrity { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let registry = UserRegistry::new(&KeyConfig::generate());
        let store = MemoryAuthStore::new();
        let mut tx = store.begin_transaction().await.unwrap();
        let user = UserId::generate();

        assert!(!registry.user_exists(tx.as_mut(), &user).await.unwrap());
        assert!(matches!(
            registry.fetch_user(tx.as_mut(), &user).await,
            Err(AuthzError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_register_twice_fails() {
        let registry = UserRegistry::new(&KeyConfig::generate());
        let store = MemoryAuthStore::new();
        let mut tx = store.begin_transaction().await.unwrap();
        let user = UserId::generate();

        registry
            .register_user(tx.as_mut(), user, ScopeSet::empty())
            .await
            .unwrap();
        assert!(matches!(
            registry.register_user(tx.as_mut(), user, ScopeSet::empty()).await,
            Err(AuthzError::Store(StoreError::AlreadyExists(_)))
        ));
    }

    #[tokio::test]
    async fn test_copied_record_fails_verification() {
        let registry = UserRegistry::new(&KeyConfig::generate());
        let store = MemoryAuthStore::new();
        let mut tx = store.begin_transaction().await.unwrap();

        let user = registry
            .create_user(tx.as_mut(), ScopeSet::all())
            .await
            .unwrap();
        let stored = tx.get_user(&user).await.unwrap().unwrap();
        let other = UserId::generate();
        tx.insert_user(&other, &stored.data, &stored.tag).await.unwrap();

        assert!(matches!(
            registry.fetch_user(tx.as_mut(), &other).await,
            Err(AuthzError::Integrity { .. })
        ));
    }
}
