//! Typed requests, responses and the method each request is served as.

use std::fmt;

use keyward_core::{ObjectId, Scope, ScopeSet, UserId, WrappedKey};

use crate::authn::Credential;

/// The service's methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Store,
    Encrypt,
    Retrieve,
    Decrypt,
    AddPermission,
    RemovePermission,
    GetPermissions,
    Update,
    Delete,
    CreateUser,
    RemoveUser,
}

impl Method {
    pub const ALL: [Method; 11] = [
        Method::Store,
        Method::Encrypt,
        Method::Retrieve,
        Method::Decrypt,
        Method::AddPermission,
        Method::RemovePermission,
        Method::GetPermissions,
        Method::Update,
        Method::Delete,
        Method::CreateUser,
        Method::RemoveUser,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Store => "Store",
            Method::Encrypt => "Encrypt",
            Method::Retrieve => "Retrieve",
            Method::Decrypt => "Decrypt",
            Method::AddPermission => "AddPermission",
            Method::RemovePermission => "RemovePermission",
            Method::GetPermissions => "GetPermissions",
            Method::Update => "Update",
            Method::Delete => "Delete",
            Method::CreateUser => "CreateUser",
            Method::RemoveUser => "RemoveUser",
        }
    }

    /// The scope a caller must hold to use this method at all.
    pub const fn required_scope(&self) -> Scope {
        match self {
            Method::Store | Method::Encrypt => Scope::Create,
            Method::Retrieve | Method::Decrypt => Scope::Read,
            Method::Update => Scope::Update,
            Method::Delete => Scope::Delete,
            Method::GetPermissions => Scope::Index,
            Method::AddPermission | Method::RemovePermission => Scope::ObjectPermissions,
            Method::CreateUser | Method::RemoveUser => Scope::UserManagement,
        }
    }

    /// Whether the caller must be a member of the target object's Access
    /// Object before the handler runs.
    ///
    /// Methods that create objects or manage users have no target object.
    pub const fn requires_object_authorization(&self) -> bool {
        !matches!(
            self,
            Method::Store | Method::Encrypt | Method::CreateUser | Method::RemoveUser
        )
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A call's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Store {
        plaintext: Vec<u8>,
        aad: Vec<u8>,
    },
    Encrypt {
        plaintext: Vec<u8>,
        aad: Vec<u8>,
    },
    Retrieve {
        object_id: ObjectId,
    },
    Decrypt {
        object_id: ObjectId,
        ciphertext: Vec<u8>,
        aad: Vec<u8>,
    },
    AddPermission {
        object_id: ObjectId,
        user_id: UserId,
    },
    RemovePermission {
        object_id: ObjectId,
        user_id: UserId,
    },
    GetPermissions {
        object_id: ObjectId,
    },
    Update {
        object_id: ObjectId,
        plaintext: Vec<u8>,
        aad: Vec<u8>,
    },
    Delete {
        object_id: ObjectId,
    },
    CreateUser {
        scopes: ScopeSet,
    },
    RemoveUser {
        user_id: UserId,
    },
}

impl Request {
    pub fn method(&self) -> Method {
        match self {
            Request::Store { .. } => Method::Store,
            Request::Encrypt { .. } => Method::Encrypt,
            Request::Retrieve { .. } => Method::Retrieve,
            Request::Decrypt { .. } => Method::Decrypt,
            Request::AddPermission { .. } => Method::AddPermission,
            Request::RemovePermission { .. } => Method::RemovePermission,
            Request::GetPermissions { .. } => Method::GetPermissions,
            Request::Update { .. } => Method::Update,
            Request::Delete { .. } => Method::Delete,
            Request::CreateUser { .. } => Method::CreateUser,
            Request::RemoveUser { .. } => Method::RemoveUser,
        }
    }

    /// The object this request targets, if any.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Request::Retrieve { object_id }
            | Request::Decrypt { object_id, .. }
            | Request::AddPermission { object_id, .. }
            | Request::RemovePermission { object_id, .. }
            | Request::GetPermissions { object_id }
            | Request::Update { object_id, .. }
            | Request::Delete { object_id } => Some(*object_id),
            Request::Store { .. }
            | Request::Encrypt { .. }
            | Request::CreateUser { .. }
            | Request::RemoveUser { .. } => None,
        }
    }
}

/// A successful call's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Stored {
        object_id: ObjectId,
    },
    Encrypted {
        object_id: ObjectId,
        ciphertext: Vec<u8>,
        wrapped_key: WrappedKey,
    },
    Retrieved {
        plaintext: Vec<u8>,
        aad: Vec<u8>,
    },
    Decrypted {
        plaintext: Vec<u8>,
    },
    Permissions {
        users: Vec<UserId>,
    },
    UserCreated {
        user_id: UserId,
        credential: Credential,
    },
    /// Mutations with nothing to return.
    Done,
}
