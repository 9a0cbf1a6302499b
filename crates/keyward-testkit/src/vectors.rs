//! Reference vectors for the MAC and record encoding.
//!
//! Each vector fixes every input (keys, ids, members) so the derived outputs
//! are deterministic. [`export_json`] dumps the computed outputs so another
//! implementation can be checked against this one.

use keyward_core::{AccessObject, MacDomain, MessageAuthenticator, ObjectId, SymmetricKey, UserId, WrappedKey};
use serde::Serialize;

/// A fixed-input MAC vector.
#[derive(Debug, Clone)]
pub struct MacVector {
    pub name: &'static str,
    pub ask: [u8; 32],
    pub domain: MacDomain,
    pub context: &'static [u8],
    pub message: &'static [u8],
}

/// A fixed-input Access Object vector.
#[derive(Debug, Clone)]
pub struct AccessObjectVector {
    pub name: &'static str,
    pub ask: [u8; 32],
    pub object_id: [u8; 16],
    pub members: &'static [[u8; 16]],
    pub wrapped_key: &'static [u8],
    pub version: u64,
}

/// Computed outputs, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComputedVector {
    pub name: String,
    pub domain: String,
    /// Record bytes (CBOR) for Access Object vectors, the message otherwise.
    pub message: String,
    pub tag: String,
}

pub fn mac_vectors() -> Vec<MacVector> {
    vec![
        MacVector {
            name: "access object domain, short message",
            ask: [0x42; 32],
            domain: MacDomain::AccessObjects,
            context: &[0x11; 16],
            message: b"hello",
        },
        MacVector {
            name: "users domain, same inputs",
            ask: [0x42; 32],
            domain: MacDomain::Users,
            context: &[0x11; 16],
            message: b"hello",
        },
        MacVector {
            name: "token domain, empty message",
            ask: [0x00; 32],
            domain: MacDomain::Token,
            context: &[0x00; 16],
            message: b"",
        },
    ]
}

pub fn access_object_vectors() -> Vec<AccessObjectVector> {
    vec![
        AccessObjectVector {
            name: "single creator",
            ask: [0x42; 32],
            object_id: [0x01; 16],
            members: &[[0x0a; 16]],
            wrapped_key: &[0xcc; 60],
            version: 0,
        },
        AccessObjectVector {
            name: "three members after two edits",
            ask: [0x42; 32],
            object_id: [0x02; 16],
            members: &[[0x0c; 16], [0x0a; 16], [0x0b; 16]],
            wrapped_key: &[0xdd; 60],
            version: 2,
        },
        AccessObjectVector {
            name: "sealed",
            ask: [0x42; 32],
            object_id: [0x03; 16],
            members: &[],
            wrapped_key: &[0xee; 60],
            version: 1,
        },
    ]
}

impl MacVector {
    pub fn compute(&self) -> ComputedVector {
        let mac = MessageAuthenticator::new(&SymmetricKey::from_bytes(self.ask), self.domain);
        ComputedVector {
            name: self.name.to_string(),
            domain: self.domain.context().to_string(),
            message: hex::encode(self.message),
            tag: mac.tag(self.context, self.message).to_hex(),
        }
    }
}

impl AccessObjectVector {
    /// Build the record. Members are added in the listed order; the record
    /// sorts them.
    pub fn access_object(&self) -> AccessObject {
        let mut members = self.members.iter().map(|m| UserId::from_bytes(*m));
        let wrapped = WrappedKey::from_bytes(self.wrapped_key.to_vec());
        let mut ao = match members.next() {
            Some(creator) => AccessObject::new(creator, wrapped),
            None => {
                // A sealed record starts with a placeholder creator that is
                // removed again.
                let placeholder = UserId::from_bytes([0xff; 16]);
                let mut ao = AccessObject::new(placeholder, wrapped);
                ao.remove_user(&placeholder);
                ao
            }
        };
        for member in members {
            ao.add_user(member);
        }
        while ao.version() < self.version {
            ao.increment_version();
        }
        ao
    }

    pub fn compute(&self) -> ComputedVector {
        let mac = MessageAuthenticator::new(
            &SymmetricKey::from_bytes(self.ask),
            MacDomain::AccessObjects,
        );
        let bytes = self
            .access_object()
            .to_bytes()
            .expect("fixed access object encodes");
        let object_id = ObjectId::from_bytes(self.object_id);
        ComputedVector {
            name: self.name.to_string(),
            domain: MacDomain::AccessObjects.context().to_string(),
            message: hex::encode(&bytes),
            tag: mac.tag(object_id.as_bytes(), &bytes).to_hex(),
        }
    }
}

/// Compute every vector.
pub fn compute_all() -> Vec<ComputedVector> {
    mac_vectors()
        .iter()
        .map(MacVector::compute)
        .chain(access_object_vectors().iter().map(AccessObjectVector::compute))
        .collect()
}

/// Computed vectors as pretty-printed JSON.
pub fn export_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&compute_all())
}
