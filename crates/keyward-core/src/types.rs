//! Strong identifier types for Keyward.
//!
//! All identifiers are 128-bit UUIDs wrapped in newtypes so an object id can
//! never be passed where a user id is expected. The service generates every
//! identifier; clients only ever echo them back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a stored object and its Access Object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Generate a fresh random (v4) object id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get the raw bytes. These are the bytes bound into the access object tag.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// The underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Key of the associated-data blob in the object store.
    pub fn aad_key(&self) -> String {
        format!("{}{}", self.0, AAD_SUFFIX)
    }

    /// Key of the ciphertext blob in the object store.
    pub fn data_key(&self) -> String {
        format!("{}{}", self.0, DATA_SUFFIX)
    }
}

/// Object store key suffix for associated data.
pub const AAD_SUFFIX: &str = "_aad";

/// Object store key suffix for ciphertext.
pub const DATA_SUFFIX: &str = "_data";

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for ObjectId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl TryFrom<&[u8]> for ObjectId {
    type Error = uuid::Error;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        Uuid::from_slice(slice).map(Self)
    }
}

/// Identifier of a user (a principal that can be granted access).
///
/// Ordering is byte order of the UUID, which is also the order
/// `GetPermissions` reports users in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a fresh random (v4) user id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// The underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl TryFrom<&[u8]> for UserId {
    type Error = uuid::Error;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        Uuid::from_slice(slice).map(Self)
    }
}

/// Correlation id assigned to every inbound request.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_string_roundtrip() {
        let id = ObjectId::generate();
        let parsed: ObjectId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_object_id_blob_keys() {
        let id = ObjectId::from_bytes([0x11; 16]);
        assert_eq!(id.aad_key(), "11111111-1111-1111-1111-111111111111_aad");
        assert_eq!(id.data_key(), "11111111-1111-1111-1111-111111111111_data");
    }

    #[test]
    fn test_user_id_orders_by_bytes() {
        let low = UserId::from_bytes([0x01; 16]);
        let high = UserId::from_bytes([0xf0; 16]);
        assert!(low < high);
    }

    #[test]
    fn test_user_id_from_short_slice_fails() {
        assert!(UserId::try_from(&[0u8; 15][..]).is_err());
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(RequestId::generate(), RequestId::generate());
    }
}
