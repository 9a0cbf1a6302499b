//! The assembled service.

use std::sync::Arc;

use keyward_authz::{Authorizer, UserRegistry};
use keyward_core::{Cryptor, KeyConfig, ObjectId, ScopeSet, UserId, WrappedKey};
use keyward_store::{
    AuthStore, MemoryAuthStore, MemoryObjectStore, ObjectStore, SqliteAuthStore,
    SqliteObjectStore,
};

use crate::authn::{Authenticator, Credential, TokenAuthenticator};
use crate::config::{ServiceConfig, StorageConfig};
use crate::error::{Result, Status};
use crate::handlers::Handlers;
use crate::operations::{Request, Response};
use crate::pipeline::Pipeline;

type CallResult<T> = std::result::Result<T, Status>;

/// Keyward: envelope encryption with per-object access control.
///
/// Every call goes through the standard [`Pipeline`]. The typed methods are
/// thin wrappers over [`Service::call`].
pub struct Service {
    auth_store: Arc<dyn AuthStore>,
    users: Arc<UserRegistry>,
    pipeline: Pipeline,
}

impl Service {
    pub fn new(
        keys: Arc<KeyConfig>,
        auth_store: Arc<dyn AuthStore>,
        object_store: Arc<dyn ObjectStore>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let cryptor = Arc::new(Cryptor::new(keys.kek()));
        let authorizer = Arc::new(Authorizer::new(&keys));
        let users = Arc::new(UserRegistry::new(&keys));

        let handlers = Arc::new(Handlers::new(
            cryptor,
            authorizer.clone(),
            users.clone(),
            object_store,
            authenticator.clone(),
        ));
        let pipeline = Pipeline::standard(
            auth_store.clone(),
            authenticator,
            users.clone(),
            authorizer,
            handlers,
        );

        Self {
            auth_store,
            users,
            pipeline,
        }
    }

    /// Build from configuration, authenticating with [`TokenAuthenticator`].
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let keys = Arc::new(config.keys.clone());
        let (auth_store, object_store): (Arc<dyn AuthStore>, Arc<dyn ObjectStore>) =
            match &config.storage {
                StorageConfig::Memory => (
                    Arc::new(MemoryAuthStore::new()),
                    Arc::new(MemoryObjectStore::new()),
                ),
                StorageConfig::Sqlite { auth_db, object_db } => (
                    Arc::new(SqliteAuthStore::open(auth_db)?),
                    Arc::new(SqliteObjectStore::open(object_db)?),
                ),
            };
        let authenticator = Arc::new(TokenAuthenticator::new(&keys));

        tracing::info!(storage = ?config.storage, "keyward service configured");
        Ok(Self::new(keys, auth_store, object_store, authenticator))
    }

    /// Register a new user outside the pipeline.
    ///
    /// This is the bootstrap path for the first administrator; afterwards
    /// callers holding the user management scope use
    /// [`Service::create_user`].
    pub async fn provision_user(&self, scopes: ScopeSet) -> Result<UserId> {
        let mut tx = self.auth_store.begin_transaction().await?;
        let user_id = self.users.create_user(tx.as_mut(), scopes).await?;
        tx.commit().await?;
        Ok(user_id)
    }

    /// Serve one call through the pipeline.
    pub async fn call(&self, credential: &Credential, request: Request) -> CallResult<Response> {
        self.pipeline.call(credential, request).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Typed Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Encrypt and persist; returns the new object's id.
    pub async fn store(
        &self,
        credential: &Credential,
        plaintext: impl Into<Vec<u8>>,
        aad: impl Into<Vec<u8>>,
    ) -> CallResult<ObjectId> {
        let request = Request::Store {
            plaintext: plaintext.into(),
            aad: aad.into(),
        };
        match self.call(credential, request).await? {
            Response::Stored { object_id } => Ok(object_id),
            other => unexpected(other),
        }
    }

    /// Encrypt without persisting; returns `(object_id, ciphertext, wrapped_key)`.
    pub async fn encrypt(
        &self,
        credential: &Credential,
        plaintext: impl Into<Vec<u8>>,
        aad: impl Into<Vec<u8>>,
    ) -> CallResult<(ObjectId, Vec<u8>, WrappedKey)> {
        let request = Request::Encrypt {
            plaintext: plaintext.into(),
            aad: aad.into(),
        };
        match self.call(credential, request).await? {
            Response::Encrypted {
                object_id,
                ciphertext,
                wrapped_key,
            } => Ok((object_id, ciphertext, wrapped_key)),
            other => unexpected(other),
        }
    }

    /// Load and decrypt a stored object; returns `(plaintext, aad)`.
    pub async fn retrieve(
        &self,
        credential: &Credential,
        object_id: ObjectId,
    ) -> CallResult<(Vec<u8>, Vec<u8>)> {
        match self.call(credential, Request::Retrieve { object_id }).await? {
            Response::Retrieved { plaintext, aad } => Ok((plaintext, aad)),
            other => unexpected(other),
        }
    }

    /// Decrypt a ciphertext produced by [`Service::encrypt`].
    pub async fn decrypt(
        &self,
        credential: &Credential,
        object_id: ObjectId,
        ciphertext: impl Into<Vec<u8>>,
        aad: impl Into<Vec<u8>>,
    ) -> CallResult<Vec<u8>> {
        let request = Request::Decrypt {
            object_id,
            ciphertext: ciphertext.into(),
            aad: aad.into(),
        };
        match self.call(credential, request).await? {
            Response::Decrypted { plaintext } => Ok(plaintext),
            other => unexpected(other),
        }
    }

    /// Re-encrypt a stored object's contents under its existing key.
    pub async fn update(
        &self,
        credential: &Credential,
        object_id: ObjectId,
        plaintext: impl Into<Vec<u8>>,
        aad: impl Into<Vec<u8>>,
    ) -> CallResult<()> {
        let request = Request::Update {
            object_id,
            plaintext: plaintext.into(),
            aad: aad.into(),
        };
        self.call_done(credential, request).await
    }

    pub async fn delete(&self, credential: &Credential, object_id: ObjectId) -> CallResult<()> {
        self.call_done(credential, Request::Delete { object_id }).await
    }

    pub async fn add_permission(
        &self,
        credential: &Credential,
        object_id: ObjectId,
        user_id: UserId,
    ) -> CallResult<()> {
        self.call_done(credential, Request::AddPermission { object_id, user_id })
            .await
    }

    pub async fn remove_permission(
        &self,
        credential: &Credential,
        object_id: ObjectId,
        user_id: UserId,
    ) -> CallResult<()> {
        self.call_done(credential, Request::RemovePermission { object_id, user_id })
            .await
    }

    /// Members of the object's Access Object, in byte order.
    pub async fn get_permissions(
        &self,
        credential: &Credential,
        object_id: ObjectId,
    ) -> CallResult<Vec<UserId>> {
        match self
            .call(credential, Request::GetPermissions { object_id })
            .await?
        {
            Response::Permissions { users } => Ok(users),
            other => unexpected(other),
        }
    }

    /// Register a user holding `scopes`; returns their id and a credential
    /// minted by the authenticator.
    pub async fn create_user(
        &self,
        credential: &Credential,
        scopes: ScopeSet,
    ) -> CallResult<(UserId, Credential)> {
        match self.call(credential, Request::CreateUser { scopes }).await? {
            Response::UserCreated {
                user_id,
                credential,
            } => Ok((user_id, credential)),
            other => unexpected(other),
        }
    }

    pub async fn remove_user(&self, credential: &Credential, user_id: UserId) -> CallResult<()> {
        self.call_done(credential, Request::RemoveUser { user_id })
            .await
    }

    async fn call_done(&self, credential: &Credential, request: Request) -> CallResult<()> {
        match self.call(credential, request).await? {
            Response::Done => Ok(()),
            other => unexpected(other),
        }
    }
}

fn unexpected<T>(_: Response) -> CallResult<T> {
    tracing::error!("handler returned the wrong response kind");
    Err(Status::internal())
}
