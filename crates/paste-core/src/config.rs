//! Typed configuration for the persistence layer.
//!
//! Every section deserializes from TOML/JSON with defaults matching a stock
//! deployment, so an empty file is a valid configuration. Loading files and
//! applying environment overrides is the caller's job.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::error::{PasteError, Result};

const DEFAULT_EXPIRE_MS: u64 = 3 * 24 * 60 * 60 * 1000;
const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;
const DEFAULT_KEY_CHARS: &str = "abcdefghijklmnopqrstivwxyz0123456789";

/// Which storage engine backs the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// One JSON file per document under a root directory.
    #[default]
    File,
    /// ArangoDB collection with a native TTL index.
    #[serde(alias = "arangodb", alias = "arango")]
    Document,
    /// SQLite table.
    #[serde(alias = "sqlite")]
    Relational,
    /// Redis hashes with native key expiry.
    #[serde(alias = "redis")]
    Cache,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::File => "file",
            StorageKind::Document => "document",
            StorageKind::Relational => "relational",
            StorageKind::Cache => "cache",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = PasteError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "document" | "arangodb" | "arango" => Ok(StorageKind::Document),
            "relational" | "sqlite" => Ok(StorageKind::Relational),
            "cache" | "redis" => Ok(StorageKind::Cache),
            other => Err(PasteError::Config(format!(
                "Unsupported storage kind: {} (use file, document, relational or cache)",
                other
            ))),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PasteConfig {
    pub storage: StorageConfig,
    pub encryption: EncryptionConfig,
    pub keys: KeyConfig,
    pub document: DocumentConfig,
}

/// Everything `prepare` needs to reach and set up a backend.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,
    pub database: String,
    /// Root directory for the file backend and the SQLite database file.
    pub path: PathBuf,
    /// Sliding expiry window in milliseconds.
    pub document_expire_ms: u64,
    /// How often the reaper sweeps backends without native expiry.
    pub sweep_interval_secs: u64,
    pub cache: CacheConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::File,
            host: "127.0.0.1".to_string(),
            port: 8529,
            user: "root".to_string(),
            password: None,
            database: "pasteServer".to_string(),
            path: PathBuf::from("data"),
            document_expire_ms: DEFAULT_EXPIRE_MS,
            sweep_interval_secs: 60,
            cache: CacheConfig::default(),
        }
    }
}

impl StorageConfig {
    /// The sliding expiry window.
    pub fn expiry_window(&self) -> Duration {
        Duration::from_millis(self.document_expire_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Location of the SQLite database for the relational backend.
    ///
    /// `:memory:` as the database name selects an in-memory database.
    pub fn sqlite_path(&self) -> PathBuf {
        if self.database == ":memory:" {
            return PathBuf::from(":memory:");
        }
        self.path.join(format!("{}.sqlite3", self.database))
    }

    pub fn validate(&self) -> Result<()> {
        if self.document_expire_ms < 1000 {
            return Err(PasteError::Config(
                "document_expire_ms must be at least 1000".to_string(),
            ));
        }
        if matches!(self.kind, StorageKind::File | StorageKind::Relational)
            && self.path.as_os_str().is_empty()
            && self.database != ":memory:"
        {
            return Err(PasteError::Config("storage path cannot be empty".to_string()));
        }
        if self.kind == StorageKind::Document && self.database.trim().is_empty() {
            return Err(PasteError::Config("database name cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Redis connection settings.
///
/// Used by the cache-store backend itself and, when `enabled`, by the
/// read-through cache placed in front of any other backend.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,
    /// Lifetime of read-through cache entries, in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            ttl_secs: DEFAULT_CACHE_TTL_SECONDS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.max(1))
    }
}

/// At-rest encryption settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    pub enabled: bool,
    /// 32 bytes of key material as 64 hex characters.
    #[serde(deserialize_with = "deserialize_secret")]
    pub key: Option<SecretString>,
    /// Alternative to `key`: derive the key from a passphrase.
    #[serde(deserialize_with = "deserialize_secret")]
    pub passphrase: Option<SecretString>,
    /// Salt for passphrase derivation (at least 16 bytes).
    pub salt: Option<String>,
}

/// Lookup-key and delete-secret generation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub key_length: usize,
    pub key_chars: String,
    pub with_uppercase: bool,
    pub secret_min_length: usize,
    pub secret_max_length: usize,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            key_length: 10,
            key_chars: DEFAULT_KEY_CHARS.to_string(),
            with_uppercase: true,
            secret_min_length: 12,
            secret_max_length: 27,
        }
    }
}

/// Limits applied before a document reaches storage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Maximum paste size in bytes.
    pub max_length: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self { max_length: 400_000 }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .filter(|raw| !raw.trim().is_empty())
        .map(SecretString::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: PasteConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.storage.kind, StorageKind::File);
        assert_eq!(config.storage.path, PathBuf::from("data"));
        assert_eq!(
            config.storage.expiry_window(),
            Duration::from_secs(3 * 24 * 60 * 60)
        );
        assert_eq!(config.keys.key_length, 10);
        assert!(config.keys.with_uppercase);
        assert_eq!(config.document.max_length, 400_000);
        assert!(!config.encryption.enabled);
    }

    #[test]
    fn test_kind_aliases() {
        let config: StorageConfig = serde_json::from_str(r#"{"kind": "redis"}"#).unwrap();
        assert_eq!(config.kind, StorageKind::Cache);
        assert_eq!("arangodb".parse::<StorageKind>().unwrap(), StorageKind::Document);
        assert_eq!("SQLite".parse::<StorageKind>().unwrap(), StorageKind::Relational);
        assert!("mongodb".parse::<StorageKind>().is_err());
    }

    #[test]
    fn test_secret_fields_are_wrapped() {
        let config: StorageConfig =
            serde_json::from_str(r#"{"password": "hunter2", "cache": {"password": ""}}"#).unwrap();
        assert_eq!(config.password.as_ref().unwrap().expose_secret(), "hunter2");
        assert!(config.cache.password.is_none());
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_sqlite_path() {
        let mut config = StorageConfig {
            path: PathBuf::from("/var/lib/paste"),
            ..StorageConfig::default()
        };
        assert_eq!(
            config.sqlite_path(),
            PathBuf::from("/var/lib/paste/pasteServer.sqlite3")
        );
        config.database = ":memory:".to_string();
        assert_eq!(config.sqlite_path(), PathBuf::from(":memory:"));
    }

    #[test]
    fn test_validate_rejects_tiny_window() {
        let config = StorageConfig {
            document_expire_ms: 10,
            ..StorageConfig::default()
        };
        assert!(matches!(config.validate(), Err(PasteError::Config(_))));
        assert!(StorageConfig::default().validate().is_ok());
    }
}
