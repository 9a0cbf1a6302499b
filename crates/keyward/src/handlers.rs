//! Method handlers: envelope encryption, blob storage, permission edits and
//! user management.
//!
//! Handlers run after the pipeline has authenticated the caller and, for
//! methods that target an object, attached the verified Access Object to the
//! context. A handler that mutates the auth store commits explicitly; reads
//! leave the transaction for the pipeline to roll back.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use keyward_authz::{Authorizer, UserRegistry};
use keyward_core::{AccessObject, Cryptor, ObjectId, ScopeSet, UserId};
use keyward_store::ObjectStore;

use crate::authn::Authenticator;
use crate::context::RequestContext;
use crate::error::{Result, ServiceError};
use crate::operations::{Request, Response};
use crate::pipeline::Handler;

/// The service's method handlers.
pub struct Handlers {
    cryptor: Arc<Cryptor>,
    authorizer: Arc<Authorizer>,
    users: Arc<UserRegistry>,
    objects: Arc<dyn ObjectStore>,
    authenticator: Arc<dyn Authenticator>,
}

impl Handlers {
    pub fn new(
        cryptor: Arc<Cryptor>,
        authorizer: Arc<Authorizer>,
        users: Arc<UserRegistry>,
        objects: Arc<dyn ObjectStore>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            cryptor,
            authorizer,
            users,
            objects,
            authenticator,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Object Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    async fn store(
        &self,
        ctx: &mut RequestContext,
        plaintext: Vec<u8>,
        aad: Vec<u8>,
    ) -> Result<Response> {
        let creator = ctx.caller()?;
        let object_id = ObjectId::generate();
        ctx.object_id = Some(object_id);

        let (wrapped_key, ciphertext) = self.cryptor.encrypt(&plaintext, &aad)?;
        self.authorizer
            .create_access_object(ctx.tx()?, &object_id, creator, wrapped_key)
            .await?;

        // Blobs land before the commit; if the commit fails they are orphans.
        self.objects
            .store(&object_id.aad_key(), Bytes::from(aad))
            .await?;
        self.objects
            .store(&object_id.data_key(), Bytes::from(ciphertext))
            .await?;

        ctx.commit().await?;
        tracing::info!(%object_id, "object stored");
        Ok(Response::Stored { object_id })
    }

    async fn encrypt(
        &self,
        ctx: &mut RequestContext,
        plaintext: Vec<u8>,
        aad: Vec<u8>,
    ) -> Result<Response> {
        let creator = ctx.caller()?;
        let object_id = ObjectId::generate();
        ctx.object_id = Some(object_id);

        let (wrapped_key, ciphertext) = self.cryptor.encrypt(&plaintext, &aad)?;
        self.authorizer
            .create_access_object(ctx.tx()?, &object_id, creator, wrapped_key.clone())
            .await?;
        ctx.commit().await?;

        tracing::info!(%object_id, "object encrypted");
        Ok(Response::Encrypted {
            object_id,
            ciphertext,
            wrapped_key,
        })
    }

    async fn retrieve(&self, ctx: &mut RequestContext) -> Result<Response> {
        let (object_id, access_object) = ctx.authorized_object()?;
        let wrapped_key = access_object.wrapped_key().clone();

        let aad = self.objects.retrieve(&object_id.aad_key()).await?;
        let ciphertext = self.objects.retrieve(&object_id.data_key()).await?;
        let plaintext = self.cryptor.decrypt(&wrapped_key, &ciphertext, &aad)?;

        Ok(Response::Retrieved {
            plaintext,
            aad: aad.to_vec(),
        })
    }

    async fn decrypt(
        &self,
        ctx: &mut RequestContext,
        ciphertext: Vec<u8>,
        aad: Vec<u8>,
    ) -> Result<Response> {
        let (_, access_object) = ctx.authorized_object()?;
        let plaintext = self
            .cryptor
            .decrypt(access_object.wrapped_key(), &ciphertext, &aad)?;
        Ok(Response::Decrypted { plaintext })
    }

    async fn update(
        &self,
        ctx: &mut RequestContext,
        plaintext: Vec<u8>,
        aad: Vec<u8>,
    ) -> Result<Response> {
        let (object_id, access_object) = ctx.authorized_object()?;
        let ciphertext =
            self.cryptor
                .encrypt_with_key(&plaintext, &aad, access_object.wrapped_key())?;

        self.objects
            .store(&object_id.aad_key(), Bytes::from(aad))
            .await?;
        self.objects
            .store(&object_id.data_key(), Bytes::from(ciphertext))
            .await?;

        tracing::info!(%object_id, "object updated");
        Ok(Response::Done)
    }

    async fn delete(&self, ctx: &mut RequestContext) -> Result<Response> {
        let (object_id, _) = ctx.authorized_object()?;
        self.authorizer
            .delete_access_object(ctx.tx()?, &object_id)
            .await?;
        ctx.commit().await?;

        // The object is gone once the commit lands; blob cleanup is best effort.
        for key in [object_id.aad_key(), object_id.data_key()] {
            if let Err(e) = self.objects.delete(&key).await {
                tracing::warn!(%object_id, key = key.as_str(), error = %e, "orphaned blob after delete");
            }
        }

        tracing::info!(%object_id, "object deleted");
        Ok(Response::Done)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    async fn add_permission(&self, ctx: &mut RequestContext, target: UserId) -> Result<Response> {
        if !self.users.user_exists(ctx.tx()?, &target).await? {
            return Err(ServiceError::InvalidArgument(format!(
                "user {target} does not exist"
            )));
        }

        let (object_id, mut access_object) = self.take_access_object(ctx)?;
        self.authorizer
            .add_permission(ctx.tx()?, &object_id, &mut access_object, target)
            .await?;
        ctx.commit().await?;

        tracing::info!(%object_id, target = %target, "permission added");
        Ok(Response::Done)
    }

    async fn remove_permission(
        &self,
        ctx: &mut RequestContext,
        target: UserId,
    ) -> Result<Response> {
        let (object_id, mut access_object) = self.take_access_object(ctx)?;
        self.authorizer
            .remove_permission(ctx.tx()?, &object_id, &mut access_object, &target)
            .await?;
        ctx.commit().await?;

        if access_object.is_sealed() {
            tracing::warn!(%object_id, "last member removed; object is sealed");
        }
        tracing::info!(%object_id, target = %target, "permission removed");
        Ok(Response::Done)
    }

    async fn get_permissions(&self, ctx: &mut RequestContext) -> Result<Response> {
        let (_, access_object) = ctx.authorized_object()?;
        Ok(Response::Permissions {
            users: access_object.users().to_vec(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    async fn create_user(&self, ctx: &mut RequestContext, scopes: ScopeSet) -> Result<Response> {
        let user_id = self.users.create_user(ctx.tx()?, scopes).await?;
        // Without a credential the new user could never call in; keep nothing.
        let credential = self.authenticator.issue_credential(&user_id).ok_or_else(|| {
            ServiceError::Internal("authenticator cannot issue credentials".into())
        })?;
        ctx.commit().await?;

        tracing::info!(%user_id, %scopes, "user created");
        Ok(Response::UserCreated {
            user_id,
            credential,
        })
    }

    async fn remove_user(&self, ctx: &mut RequestContext, target: UserId) -> Result<Response> {
        self.users.remove_user(ctx.tx()?, &target).await?;
        ctx.commit().await?;

        tracing::info!(target = %target, "user removed");
        Ok(Response::Done)
    }

    /// Move the Access Object out of the context so it can be edited while
    /// the transaction is borrowed.
    fn take_access_object(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<(ObjectId, AccessObject)> {
        let (object_id, _) = ctx.authorized_object()?;
        let access_object = ctx
            .access_object
            .take()
            .ok_or_else(|| ServiceError::Internal("request was not authorized".into()))?;
        Ok((object_id, access_object))
    }
}

#[async_trait]
impl Handler for Handlers {
    async fn handle(&self, ctx: &mut RequestContext, request: Request) -> Result<Response> {
        match request {
            Request::Store { plaintext, aad } => self.store(ctx, plaintext, aad).await,
            Request::Encrypt { plaintext, aad } => self.encrypt(ctx, plaintext, aad).await,
            Request::Retrieve { .. } => self.retrieve(ctx).await,
            Request::Decrypt {
                ciphertext, aad, ..
            } => self.decrypt(ctx, ciphertext, aad).await,
            Request::AddPermission { user_id, .. } => self.add_permission(ctx, user_id).await,
            Request::RemovePermission { user_id, .. } => {
                self.remove_permission(ctx, user_id).await
            }
            Request::GetPermissions { .. } => self.get_permissions(ctx).await,
            Request::Update {
                plaintext, aad, ..
            } => self.update(ctx, plaintext, aad).await,
            Request::Delete { .. } => self.delete(ctx).await,
            Request::CreateUser { scopes } => self.create_user(ctx, scopes).await,
            Request::RemoveUser { user_id } => self.remove_user(ctx, user_id).await,
        }
    }
}
