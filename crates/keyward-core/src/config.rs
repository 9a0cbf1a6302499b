//! Master key configuration.
//!
//! The three master keys are loaded once at startup into a [`KeyConfig`],
//! which is then shared read-only (typically behind an `Arc`) with the
//! cryptor, the authorizer and the token authenticator. There is no global
//! key state.

use serde::Deserialize;
use std::fmt;

use crate::crypto::{SymmetricKey, KEY_LEN};
use crate::error::{CoreError, Result};
use crate::mac::{MacDomain, MessageAuthenticator};

/// The process-wide master keys.
#[derive(Clone, Deserialize)]
#[serde(try_from = "HexKeys")]
pub struct KeyConfig {
    kek: SymmetricKey,
    ask: SymmetricKey,
    tek: SymmetricKey,
}

/// Hex form of the keys as it appears in configuration files.
#[derive(Deserialize)]
struct HexKeys {
    kek: String,
    ask: String,
    tek: String,
}

impl TryFrom<HexKeys> for KeyConfig {
    type Error = CoreError;

    fn try_from(raw: HexKeys) -> Result<Self> {
        Self::from_hex(&raw.kek, &raw.ask, &raw.tek)
    }
}

impl KeyConfig {
    /// Build from already-decoded keys.
    pub fn new(kek: SymmetricKey, ask: SymmetricKey, tek: SymmetricKey) -> Self {
        Self { kek, ask, tek }
    }

    /// Parse the three keys from hex. Each must decode to exactly 32 bytes.
    pub fn from_hex(kek: &str, ask: &str, tek: &str) -> Result<Self> {
        Ok(Self {
            kek: parse_key("kek", kek)?,
            ask: parse_key("ask", ask)?,
            tek: parse_key("tek", tek)?,
        })
    }

    /// Random keys. Data encrypted under them is lost when they are dropped.
    pub fn generate() -> Self {
        Self {
            kek: SymmetricKey::generate(),
            ask: SymmetricKey::generate(),
            tek: SymmetricKey::generate(),
        }
    }

    /// Master data key.
    pub fn kek(&self) -> &SymmetricKey {
        &self.kek
    }

    /// Master authorization key.
    pub fn ask(&self) -> &SymmetricKey {
        &self.ask
    }

    /// Master token key.
    pub fn tek(&self) -> &SymmetricKey {
        &self.tek
    }

    /// Authenticator for `domain` keyed by the ASK.
    pub fn authenticator(&self, domain: MacDomain) -> MessageAuthenticator {
        MessageAuthenticator::new(&self.ask, domain)
    }
}

fn parse_key(name: &'static str, hex_str: &str) -> Result<SymmetricKey> {
    let bytes = hex::decode(hex_str.trim()).map_err(|e| CoreError::InvalidKey {
        name,
        reason: e.to_string(),
    })?;
    if bytes.len() != KEY_LEN {
        return Err(CoreError::InvalidKey {
            name,
            reason: format!("expected {} bytes, got {}", KEY_LEN, bytes.len()),
        });
    }
    SymmetricKey::from_slice(&bytes).map_err(CoreError::from)
}

impl fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyConfig { kek: <redacted>, ask: <redacted>, tek: <redacted> }")
    }
}
