//! Service configuration.
//!
//! Parsed from TOML. Finding the file (paths, environment) is the caller's
//! business.
//!
//! ```toml
//! [keys]
//! kek = "<64 hex chars>"
//! ask = "<64 hex chars>"
//! tek = "<64 hex chars>"
//!
//! [storage]
//! backend = "sqlite"
//! auth_db = "/var/lib/keyward/auth.db"
//! object_db = "/var/lib/keyward/objects.db"
//! ```

use std::path::PathBuf;

use keyward_core::KeyConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Master keys, hex encoded.
    pub keys: KeyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Where auth records and blobs live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Process memory; everything is lost on exit.
    #[default]
    Memory,
    Sqlite {
        auth_db: PathBuf,
        object_db: PathBuf,
    },
}

impl ServiceConfig {
    pub fn new(keys: KeyConfig) -> Self {
        Self {
            keys,
            storage: StorageConfig::default(),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &str = "0101010101010101010101010101010101010101010101010101010101010101";
    const KEY_B: &str = "0202020202020202020202020202020202020202020202020202020202020202";
    const KEY_C: &str = "0303030303030303030303030303030303030303030303030303030303030303";

    fn keys_section() -> String {
        format!("[keys]\nkek = \"{KEY_A}\"\nask = \"{KEY_B}\"\ntek = \"{KEY_C}\"\n")
    }

    #[test]
    fn test_memory_is_default() {
        let config = ServiceConfig::from_toml_str(&keys_section()).unwrap();
        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.keys.kek().as_bytes(), &[1u8; 32]);
        assert_eq!(config.keys.tek().as_bytes(), &[3u8; 32]);
    }

    #[test]
    fn test_sqlite_storage() {
        let toml = format!(
            "{}\n[storage]\nbackend = \"sqlite\"\nauth_db = \"a.db\"\nobject_db = \"o.db\"\n",
            keys_section()
        );
        let config = ServiceConfig::from_toml_str(&toml).unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::Sqlite {
                auth_db: "a.db".into(),
                object_db: "o.db".into(),
            }
        );
    }

    #[test]
    fn test_short_key_rejected() {
        let toml = format!("[keys]\nkek = \"0102\"\nask = \"{KEY_B}\"\ntek = \"{KEY_C}\"\n");
        assert!(ServiceConfig::from_toml_str(&toml).is_err());
    }

    #[test]
    fn test_missing_keys_rejected() {
        assert!(ServiceConfig::from_toml_str("[storage]\nbackend = \"memory\"\n").is_err());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = ServiceConfig::from_toml_str(&keys_section()).unwrap();
        assert!(!format!("{config:?}").contains(KEY_A));
    }
}
