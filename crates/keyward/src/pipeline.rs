//! The request pipeline.
//!
//! Every call runs through the same ordered stages:
//!
//! 1. panic recovery (a panic anywhere below becomes `Internal`)
//! 2. request identity (fresh [`RequestId`])
//! 3. method enrichment (context and tracing span)
//! 4. transaction scoping ([`TransactionStage`])
//! 5. authentication ([`AuthenticationStage`])
//! 6. user scopes ([`ScopeStage`])
//! 7. authorization ([`AuthorizationStage`])
//! 8. the [`Handler`]
//!
//! The first failing stage ends the request. Whatever transaction is still
//! open when the request ends is rolled back.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};

use async_trait::async_trait;
use futures::FutureExt;
use keyward_authz::{AuthzError, Authorizer, UserRegistry};
use keyward_core::RequestId;
use keyward_store::AuthStore;
use tracing::Instrument;

use crate::authn::{AuthError, Authenticator, Credential};
use crate::context::{RequestContext, RequestState};
use crate::error::{Result, ServiceError, Status};
use crate::operations::{Request, Response};

// ─────────────────────────────────────────────────────────────────────────────
// Stage and Handler Traits
// ─────────────────────────────────────────────────────────────────────────────

/// One step run before the handler.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name, for logs.
    fn name(&self) -> &'static str;

    /// Advance the request. An error aborts it.
    async fn apply(
        &self,
        ctx: &mut RequestContext,
        credential: &Credential,
        request: &Request,
    ) -> Result<()>;
}

/// Serves a request that has passed every stage.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &mut RequestContext, request: Request) -> Result<Response>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Stages
// ─────────────────────────────────────────────────────────────────────────────

/// Opens the request's auth store transaction.
pub struct TransactionStage {
    store: Arc<dyn AuthStore>,
}

impl TransactionStage {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for TransactionStage {
    fn name(&self) -> &'static str {
        "transaction"
    }

    async fn apply(&self, ctx: &mut RequestContext, _: &Credential, _: &Request) -> Result<()> {
        let tx = self.store.begin_transaction().await?;
        ctx.attach_transaction(tx);
        Ok(())
    }
}

/// Resolves the credential to a user.
pub struct AuthenticationStage {
    authenticator: Arc<dyn Authenticator>,
}

impl AuthenticationStage {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self { authenticator }
    }
}

#[async_trait]
impl Stage for AuthenticationStage {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn apply(
        &self,
        ctx: &mut RequestContext,
        credential: &Credential,
        _: &Request,
    ) -> Result<()> {
        let user_id = self.authenticator.authenticate(credential).await?;
        ctx.user_id = Some(user_id);
        ctx.state = RequestState::Authenticated;
        tracing::debug!(%user_id, "authenticated");
        Ok(())
    }
}

/// Checks that the caller still has a user record and that it grants the
/// method's scope.
pub struct ScopeStage {
    users: Arc<UserRegistry>,
}

impl ScopeStage {
    pub fn new(users: Arc<UserRegistry>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Stage for ScopeStage {
    fn name(&self) -> &'static str {
        "scope"
    }

    async fn apply(&self, ctx: &mut RequestContext, _: &Credential, _: &Request) -> Result<()> {
        let user_id = ctx.caller()?;
        let record = match self.users.fetch_user(ctx.tx()?, &user_id).await {
            Ok(record) => record,
            Err(AuthzError::UserNotFound(_)) => {
                return Err(ServiceError::Unauthenticated(AuthError::UnknownUser))
            }
            Err(e) => return Err(e.into()),
        };

        let required = ctx.method.required_scope();
        if !record.scopes.contains(required) {
            ctx.state = RequestState::Denied;
            tracing::debug!(%user_id, scope = ?required, held = %record.scopes, "scope missing");
            return Err(ServiceError::PermissionDenied);
        }
        Ok(())
    }
}

/// Checks that the caller is a member of the target's Access Object.
///
/// Methods whose `requires_object_authorization` is false pass through.
pub struct AuthorizationStage {
    authorizer: Arc<Authorizer>,
}

impl AuthorizationStage {
    pub fn new(authorizer: Arc<Authorizer>) -> Self {
        Self { authorizer }
    }
}

#[async_trait]
impl Stage for AuthorizationStage {
    fn name(&self) -> &'static str {
        "authorization"
    }

    async fn apply(&self, ctx: &mut RequestContext, _: &Credential, request: &Request) -> Result<()> {
        if !ctx.method.requires_object_authorization() {
            ctx.state = RequestState::Skipped;
            return Ok(());
        }

        let user_id = ctx.caller()?;
        let object_id = request
            .object_id()
            .ok_or_else(|| ServiceError::InvalidArgument("request has no object id".into()))?;
        ctx.object_id = Some(object_id);

        let access_object = self
            .authorizer
            .fetch_access_object(ctx.tx()?, &object_id)
            .await?;

        if !access_object.contains_user(&user_id) {
            ctx.state = RequestState::Denied;
            return Err(ServiceError::PermissionDenied);
        }

        ctx.access_object = Some(access_object);
        ctx.state = RequestState::Authorized;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered stages in front of a handler.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    handler: Arc<dyn Handler>,
}

impl Pipeline {
    fn new(handler: Arc<dyn Handler>) -> Self {
        install_panic_hook();
        Self {
            stages: Vec::new(),
            handler,
        }
    }

    /// The standard pipeline: transaction, authentication, scope,
    /// authorization. Stage order is fixed.
    pub fn standard(
        store: Arc<dyn AuthStore>,
        authenticator: Arc<dyn Authenticator>,
        users: Arc<UserRegistry>,
        authorizer: Arc<Authorizer>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        let mut pipeline = Self::new(handler);
        pipeline.add_stage(Box::new(TransactionStage::new(store)));
        pipeline.add_stage(Box::new(AuthenticationStage::new(authenticator)));
        pipeline.add_stage(Box::new(ScopeStage::new(users)));
        pipeline.add_stage(Box::new(AuthorizationStage::new(authorizer)));
        pipeline
    }

    fn add_stage(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    /// Stage names in run order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Serve one call.
    ///
    /// Never panics and never returns error detail: failures are logged with
    /// the request's id and reported as a [`Status`].
    pub async fn call(
        &self,
        credential: &Credential,
        request: Request,
    ) -> std::result::Result<Response, Status> {
        let request_id = RequestId::generate();
        let method = request.method();
        let span = tracing::info_span!("request", %request_id, %method);

        let run = AssertUnwindSafe(self.run(request_id, credential, request)).catch_unwind();
        match run.instrument(span.clone()).await {
            Ok(result) => result,
            Err(panic) => {
                // The hook ran on this thread during the same poll.
                let backtrace = take_panic_backtrace()
                    .map(|bt| bt.to_string())
                    .unwrap_or_else(|| "unavailable".into());
                let _guard = span.enter();
                tracing::error!(
                    panic = panic_message(&*panic),
                    %backtrace,
                    "request handler panicked"
                );
                Err(Status::internal())
            }
        }
    }

    async fn run(
        &self,
        request_id: RequestId,
        credential: &Credential,
        request: Request,
    ) -> std::result::Result<Response, Status> {
        let mut ctx = RequestContext::new(request_id, request.method());

        let result = self.run_stages(&mut ctx, credential, request).await;

        if ctx.has_transaction() {
            if let Err(e) = ctx.rollback().await {
                tracing::warn!(error = %e, "rollback failed");
            }
        }

        result.map_err(|e| {
            log_failure(&ctx, &e);
            e.status()
        })
    }

    async fn run_stages(
        &self,
        ctx: &mut RequestContext,
        credential: &Credential,
        request: Request,
    ) -> Result<Response> {
        for stage in &self.stages {
            if let Err(e) = stage.apply(ctx, credential, &request).await {
                tracing::debug!(stage = stage.name(), "request aborted");
                return Err(e);
            }
        }

        let response = self.handler.handle(ctx, request).await?;
        ctx.state = RequestState::Handled;
        Ok(response)
    }
}

fn log_failure(ctx: &RequestContext, error: &ServiceError) {
    let user_id = ctx.user_id.map(|u| u.to_string());
    let object_id = ctx.object_id.map(|o| o.to_string());
    let user_id = user_id.as_deref().unwrap_or("-");
    let object_id = object_id.as_deref().unwrap_or("-");

    match error {
        ServiceError::Integrity(_) => {
            tracing::error!(user_id, object_id, error = %error, "integrity check failed")
        }
        ServiceError::PermissionDenied => {
            tracing::warn!(user_id, object_id, "permission denied")
        }
        e if e.is_caller_error() => {
            tracing::info!(user_id, object_id, error = %error, "request rejected")
        }
        _ => tracing::error!(user_id, object_id, error = %error, "request failed"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Panic Backtraces
// ─────────────────────────────────────────────────────────────────────────────

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

/// Chain a hook that records a backtrace for the panicking thread. The
/// previous hook still runs.
fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture();
            PANIC_BACKTRACE.with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(backtrace);
                }
            });
            previous(info);
        }));
    });
}

fn take_panic_backtrace() -> Option<Backtrace> {
    PANIC_BACKTRACE.with(|slot| slot.try_borrow_mut().ok().and_then(|mut slot| slot.take()))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
