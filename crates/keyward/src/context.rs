//! Per-request context threaded through the pipeline stages and handlers.

use keyward_core::{AccessObject, ObjectId, RequestId, UserId};
use keyward_store::AuthStoreTx;

use crate::error::{Result, ServiceError};
use crate::operations::Method;

/// How far a request has progressed through authentication and
/// authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Unauthenticated,
    Authenticated,
    /// The method needs no object authorization.
    Skipped,
    Authorized,
    Denied,
    Handled,
}

/// Everything the pipeline has learned about one request.
///
/// The context owns the request's auth store transaction. A handler commits
/// through [`RequestContext::commit`]; whatever is still open when the
/// pipeline finishes is rolled back.
pub struct RequestContext {
    pub request_id: RequestId,
    pub method: Method,
    pub state: RequestState,
    pub user_id: Option<UserId>,
    pub object_id: Option<ObjectId>,
    pub access_object: Option<AccessObject>,
    tx: Option<Box<dyn AuthStoreTx>>,
}

impl RequestContext {
    pub fn new(request_id: RequestId, method: Method) -> Self {
        Self {
            request_id,
            method,
            state: RequestState::Unauthenticated,
            user_id: None,
            object_id: None,
            access_object: None,
            tx: None,
        }
    }

    /// Attach the request's transaction.
    pub fn attach_transaction(&mut self, tx: Box<dyn AuthStoreTx>) {
        self.tx = Some(tx);
    }

    /// The open transaction.
    pub fn tx(&mut self) -> Result<&mut dyn AuthStoreTx> {
        match self.tx.as_deref_mut() {
            Some(tx) => Ok(tx),
            None => Err(ServiceError::Internal("no open transaction".into())),
        }
    }

    /// Whether a transaction is still open.
    pub fn has_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Commit the transaction. A failed commit leaves none of its writes
    /// visible.
    pub async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| ServiceError::Internal("no open transaction".into()))?;
        tx.commit().await.map_err(ServiceError::Storage)
    }

    /// Roll back the transaction if one is still open.
    pub async fn rollback(&mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(ServiceError::Storage),
            None => Ok(()),
        }
    }

    /// The authenticated caller.
    pub fn caller(&self) -> Result<UserId> {
        self.user_id
            .ok_or_else(|| ServiceError::Internal("caller not authenticated".into()))
    }

    /// The authorized target and its Access Object.
    pub fn authorized_object(&mut self) -> Result<(ObjectId, &mut AccessObject)> {
        match (self.object_id, self.access_object.as_mut()) {
            (Some(object_id), Some(access_object)) => Ok((object_id, access_object)),
            _ => Err(ServiceError::Internal("request was not authorized".into())),
        }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("state", &self.state)
            .field("user_id", &self.user_id)
            .field("object_id", &self.object_id)
            .field("has_transaction", &self.tx.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_store::{AuthStore, MemoryAuthStore};

    #[tokio::test]
    async fn test_commit_consumes_transaction() {
        let store = MemoryAuthStore::new();
        let mut ctx = RequestContext::new(RequestId::generate(), Method::Store);
        assert!(ctx.tx().is_err());

        ctx.attach_transaction(store.begin_transaction().await.unwrap());
        ctx.tx()
            .unwrap()
            .insert_access_object(&ObjectId::generate(), b"data", b"tag")
            .await
            .unwrap();
        ctx.commit().await.unwrap();

        assert!(!ctx.has_transaction());
        assert!(ctx.commit().await.is_err());
        assert!(ctx.rollback().await.is_ok());
        assert_eq!(store.access_object_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards() {
        let store = MemoryAuthStore::new();
        let mut ctx = RequestContext::new(RequestId::generate(), Method::Store);
        ctx.attach_transaction(store.begin_transaction().await.unwrap());
        ctx.tx()
            .unwrap()
            .insert_access_object(&ObjectId::generate(), b"data", b"tag")
            .await
            .unwrap();

        ctx.rollback().await.unwrap();
        assert_eq!(store.access_object_count().unwrap(), 0);
    }

    #[test]
    fn test_unauthorized_context_has_no_object() {
        let mut ctx = RequestContext::new(RequestId::generate(), Method::Retrieve);
        assert_eq!(ctx.state, RequestState::Unauthenticated);
        assert!(ctx.caller().is_err());
        assert!(ctx.authorized_object().is_err());
    }
}
