//! Domain-separated message authentication.
//!
//! A single master authorization key (ASK) protects several classes of data.
//! Each class gets its own domain key, derived with Blake3's key derivation
//! mode under a fixed context string, so a tag produced for one domain never
//! verifies in another.

use std::fmt;

use crate::crypto::SymmetricKey;

/// Length of a MAC tag.
pub const TAG_LEN: usize = 32;

/// The data classes a [`MessageAuthenticator`] can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacDomain {
    /// User records in the auth store.
    Users,
    /// Access Objects in the auth store.
    AccessObjects,
    /// Bearer tokens issued by the token authenticator.
    Token,
}

impl MacDomain {
    /// Blake3 derive-key context for this domain.
    pub const fn context(&self) -> &'static str {
        match self {
            MacDomain::Users => "keyward 2024 users mac v1",
            MacDomain::AccessObjects => "keyward 2024 access-objects mac v1",
            MacDomain::Token => "keyward 2024 token mac v1",
        }
    }
}

/// A 32-byte authentication tag.
///
/// Equality is constant time.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Tag(blake3::Hash);

impl Tag {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; TAG_LEN]) -> Self {
        Self(blake3::Hash::from(bytes))
    }

    /// Create from a slice. Returns `None` unless it is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; TAG_LEN] = bytes.try_into().ok()?;
        Some(Self::from_bytes(arr))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; TAG_LEN] {
        self.0.as_bytes()
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Tag {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Keyed MAC bound to one [`MacDomain`].
pub struct MessageAuthenticator {
    domain: MacDomain,
    domain_key: [u8; 32],
}

impl MessageAuthenticator {
    /// Derive the domain key for `domain` from the master key.
    pub fn new(ask: &SymmetricKey, domain: MacDomain) -> Self {
        Self {
            domain,
            domain_key: blake3::derive_key(domain.context(), ask.as_bytes()),
        }
    }

    /// The domain this authenticator is bound to.
    pub fn domain(&self) -> MacDomain {
        self.domain
    }

    /// Compute the tag over `context || message`.
    ///
    /// `context` is typically the identifier the message is bound to.
    pub fn tag(&self, context: &[u8], message: &[u8]) -> Tag {
        let mut hasher = blake3::Hasher::new_keyed(&self.domain_key);
        hasher.update(context);
        hasher.update(message);
        Tag(hasher.finalize())
    }

    /// Verify a tag in constant time.
    ///
    /// A tag of the wrong length never verifies.
    pub fn verify(&self, context: &[u8], message: &[u8], tag: &[u8]) -> bool {
        match Tag::from_slice(tag) {
            Some(tag) => self.tag(context, message) == tag,
            None => false,
        }
    }
}

impl Drop for MessageAuthenticator {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.domain_key);
    }
}

impl fmt::Debug for MessageAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageAuthenticator")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}
