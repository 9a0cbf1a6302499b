//! Access Objects and user records.
//!
//! An Access Object is the authorization record of one stored object: the set
//! of users allowed to touch it and the object's wrapped key. It is persisted
//! as CBOR bytes plus a MAC tag over `object_id || bytes`; binding the tag to
//! the id is what keeps a valid record from being replayed under another
//! object. Tagging and verification live in the authorizer; this module only
//! holds the in-memory model and its encoding.

use serde::{Deserialize, Serialize};

use crate::crypto::WrappedKey;
use crate::error::{CoreError, Result};
use crate::scope::ScopeSet;
use crate::types::UserId;

/// The authorization record for one stored object.
///
/// `authorized_users` is kept sorted and free of duplicates, so encoding is
/// deterministic and membership is a binary search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessObject {
    authorized_users: Vec<UserId>,
    wrapped_key: WrappedKey,
    version: u64,
}

impl AccessObject {
    /// Create a record whose only member is `creator`.
    pub fn new(creator: UserId, wrapped_key: WrappedKey) -> Self {
        Self {
            authorized_users: vec![creator],
            wrapped_key,
            version: 0,
        }
    }

    /// Whether `user` is a member.
    pub fn contains_user(&self, user: &UserId) -> bool {
        self.authorized_users.binary_search(user).is_ok()
    }

    /// Add a member. Adding an existing member is a no-op.
    pub fn add_user(&mut self, user: UserId) {
        if let Err(pos) = self.authorized_users.binary_search(&user) {
            self.authorized_users.insert(pos, user);
        }
    }

    /// Remove a member. Removing a non-member is a no-op.
    ///
    /// Removing the last member is allowed and leaves an object nobody can
    /// open again.
    pub fn remove_user(&mut self, user: &UserId) {
        if let Ok(pos) = self.authorized_users.binary_search(user) {
            self.authorized_users.remove(pos);
        }
    }

    /// Members in byte order.
    pub fn users(&self) -> &[UserId] {
        &self.authorized_users
    }

    /// Whether the record has been sealed by removing every member.
    pub fn is_sealed(&self) -> bool {
        self.authorized_users.is_empty()
    }

    /// The wrapped object key.
    pub fn wrapped_key(&self) -> &WrappedKey {
        &self.wrapped_key
    }

    /// Number of times the record has been rewritten.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Bump the version ahead of a rewrite.
    pub fn increment_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// Encode as CBOR.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR.
    ///
    /// Re-establishes the sorted-set invariant so a well-tagged but
    /// hand-built record cannot carry duplicates.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut record: Self =
            ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;
        record.authorized_users.sort();
        record.authorized_users.dedup();
        Ok(record)
    }
}

/// A registered user.
///
/// The auth store keeps one tagged record per user; the record's presence is
/// what makes a user a valid permission target, and its scopes bound which
/// methods the user may call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    pub scopes: ScopeSet,
    /// Unix ms at registration.
    pub created_at: i64,
}

impl UserRecord {
    pub fn new(user_id: UserId, scopes: ScopeSet, created_at: i64) -> Self {
        Self {
            user_id,
            scopes,
            created_at,
        }
    }

    /// Encode as CBOR.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(b: u8) -> UserId {
        UserId::from_bytes([b; 16])
    }

    fn record() -> AccessObject {
        AccessObject::new(user(5), WrappedKey::from_bytes(vec![1, 2, 3]))
    }

    #[test]
    fn test_creator_is_member() {
        let ao = record();
        assert!(ao.contains_user(&user(5)));
        assert_eq!(ao.users(), &[user(5)]);
        assert_eq!(ao.version(), 0);
    }

    #[test]
    fn test_add_keeps_sorted_set() {
        let mut ao = record();
        ao.add_user(user(9));
        ao.add_user(user(1));
        ao.add_user(user(9));

        assert_eq!(ao.users(), &[user(1), user(5), user(9)]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut ao = record();
        ao.remove_user(&user(7));
        assert_eq!(ao.users(), &[user(5)]);

        ao.remove_user(&user(5));
        ao.remove_user(&user(5));
        assert!(ao.is_sealed());
        assert!(!ao.contains_user(&user(5)));
    }

    #[test]
    fn test_cbor_roundtrip() {
        let mut ao = record();
        ao.add_user(user(2));
        ao.increment_version();

        let decoded = AccessObject::from_bytes(&ao.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, ao);
        assert_eq!(decoded.version(), 1);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let mut a = record();
        a.add_user(user(1));
        a.add_user(user(9));

        let mut b = record();
        b.add_user(user(9));
        b.add_user(user(1));

        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(AccessObject::from_bytes(&[0xff, 0x00, 0x13]).is_err());
    }

    #[test]
    fn test_user_record_roundtrip() {
        let rec = UserRecord::new(user(3), "rci".parse().unwrap(), 1_700_000_000_000);
        let decoded = UserRecord::from_bytes(&rec.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, rec);
    }
}
