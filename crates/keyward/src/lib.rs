//! # Keyward
//!
//! Encryption as a service with access control bound to every object.
//!
//! ## Overview
//!
//! Clients hand Keyward plaintext; Keyward encrypts it under a fresh object
//! key, wraps that key under the master data key, and records who may use it
//! in the object's Access Object. The Access Object is tagged with a keyed
//! MAC, so the auth store can be written by anyone without giving them the
//! power to grant themselves access.
//!
//! ## Key Concepts
//!
//! - **Envelope encryption**: ChaCha20-Poly1305 under a random
//!   per-object key, wrapped under the KEK
//! - **Access Object**: the sorted member list plus the wrapped key, MAC'd
//!   against its object id
//! - **Scopes**: each user record carries the kinds of method the user may
//!   call at all; object membership is checked on top
//! - **Pipeline**: every call passes panic recovery, a request id, a
//!   transaction, authentication, the scope check and authorization before
//!   its handler
//! - **Status**: clients see a code and a fixed message; detail stays in logs
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyward::{Credential, Service, ServiceConfig, TokenAuthenticator};
//! use keyward::core::{KeyConfig, ScopeSet};
//!
//! async fn example() {
//!     let config = ServiceConfig::new(KeyConfig::generate());
//!     let service = Service::from_config(&config).unwrap();
//!     let tokens = TokenAuthenticator::new(&config.keys);
//!
//!     let alice = service.provision_user(ScopeSet::all()).await.unwrap();
//!     let alice = Credential::bearer(tokens.issue(&alice));
//!
//!     let object_id = service.store(&alice, b"secret".to_vec(), b"label".to_vec()).await.unwrap();
//!     let (plaintext, aad) = service.retrieve(&alice, object_id).await.unwrap();
//!     assert_eq!(plaintext, b"secret");
//!     assert_eq!(aad, b"label");
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `keyward::core` - ids, keys, cryptor, MAC, Access Object
//! - `keyward::store` - auth store and object store backends
//! - `keyward::authz` - Authorizer and user registry

pub mod authn;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod operations;
pub mod pipeline;
pub mod service;

pub use keyward_authz as authz;
pub use keyward_core as core;
pub use keyward_store as store;

pub use authn::{AuthError, Authenticator, Credential, TokenAuthenticator};
pub use config::{ConfigError, ServiceConfig, StorageConfig};
pub use context::{RequestContext, RequestState};
pub use error::{Result, ServiceError, Status, StatusCode};
pub use handlers::Handlers;
pub use operations::{Method, Request, Response};
pub use pipeline::{Handler, Pipeline, Stage};
pub use service::Service;
