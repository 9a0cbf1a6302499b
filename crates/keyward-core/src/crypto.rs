//! Envelope encryption for Keyward.
//!
//! Every object gets a fresh 256-bit object key. The payload is sealed under
//! that key with ChaCha20-Poly1305, binding the caller's associated data into
//! the authentication tag. The object key is then sealed under the master
//! data key (KEK) with the same construction; the result is the wrapped
//! object key (WOEK) that lives inside the object's Access Object.
//!
//! Sealed layout: `ciphertext || poly1305_tag || nonce`.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Length of every symmetric key.
pub const KEY_LEN: usize = 32;

/// Length of the ChaCha20-Poly1305 nonce.
pub const NONCE_LEN: usize = 12;

/// Length of the Poly1305 tag.
pub const TAG_LEN: usize = 16;

/// Bytes added to a plaintext by [`SymmetricKey::seal`].
pub const OVERHEAD: usize = TAG_LEN + NONCE_LEN;

/// Associated data bound into every key wrap.
const WRAP_AAD: &[u8] = b"keyward-v1-object-key-wrap";

type CryptoResult<T> = std::result::Result<T, CryptoError>;

/// A 256-bit symmetric key. Zeroized on drop; never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Encrypt `plaintext` with `aad` bound into the tag.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|_| CryptoError::InvalidKeyLength(self.0.len()))?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::Encryption)?;
        sealed.extend_from_slice(&nonce);
        Ok(sealed)
    }

    /// Decrypt output of [`seal`](Self::seal). Fails if `aad` differs.
    pub fn open(&self, sealed: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
        if sealed.len() < OVERHEAD {
            return Err(CryptoError::Malformed(format!(
                "{} bytes is shorter than the {} byte overhead",
                sealed.len(),
                OVERHEAD
            )));
        }

        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|_| CryptoError::InvalidKeyLength(self.0.len()))?;

        let (body, nonce) = sealed.split_at(sealed.len() - NONCE_LEN);
        cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: body, aad })
            .map_err(|_| CryptoError::Authentication)
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// An object key sealed under the KEK.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedKey({} bytes)", self.0.len())
    }
}

impl AsRef<[u8]> for WrappedKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Envelope-encryption cryptor keyed by the master data key.
pub struct Cryptor {
    kek: SymmetricKey,
}

impl Cryptor {
    /// Create a cryptor around the master data key.
    pub fn new(kek: &SymmetricKey) -> Self {
        Self { kek: kek.clone() }
    }

    /// Encrypt under a fresh object key.
    ///
    /// # Returns
    /// `(wrapped_key, ciphertext)`.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> CryptoResult<(WrappedKey, Vec<u8>)> {
        let object_key = SymmetricKey::generate();
        let ciphertext = object_key.seal(plaintext, aad)?;
        let wrapped = self.wrap(&object_key)?;
        Ok((wrapped, ciphertext))
    }

    /// Encrypt under an existing wrapped object key.
    pub fn encrypt_with_key(
        &self,
        plaintext: &[u8],
        aad: &[u8],
        wrapped: &WrappedKey,
    ) -> CryptoResult<Vec<u8>> {
        let object_key = self.unwrap_key(wrapped)?;
        object_key.seal(plaintext, aad)
    }

    /// Unwrap the object key and decrypt.
    pub fn decrypt(
        &self,
        wrapped: &WrappedKey,
        ciphertext: &[u8],
        aad: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let object_key = self.unwrap_key(wrapped)?;
        object_key.open(ciphertext, aad)
    }

    fn wrap(&self, object_key: &SymmetricKey) -> CryptoResult<WrappedKey> {
        self.kek
            .seal(object_key.as_bytes(), WRAP_AAD)
            .map(WrappedKey)
    }

    fn unwrap_key(&self, wrapped: &WrappedKey) -> CryptoResult<SymmetricKey> {
        let mut raw = self.kek.open(wrapped.as_bytes(), WRAP_AAD)?;
        let key = SymmetricKey::from_slice(&raw);
        raw.zeroize();
        key
    }
}

impl fmt::Debug for Cryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cryptor").finish_non_exhaustive()
    }
}
