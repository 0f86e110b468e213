//! Encryption key material.

use argon2::Argon2;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::ExposeSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::EncryptionConfig;
use crate::error::{PasteError, Result};

/// Argon2id parameters for passphrase-derived keys.
///
/// - Memory: 64 MB (64 * 1024 KB)
/// - Iterations: 3
/// - Parallelism: 1
const ARGON2_MEMORY_KB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 1;

/// Length of the key in bytes (256 bits for AES-256).
pub const KEY_LENGTH: usize = 32;

const MIN_SALT_LENGTH: usize = 16;
const DEFAULT_SALT: &str = "paste-core/storage-encryption/v1";

/// Where the process key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Raw key material from configuration.
    Configured,
    /// Derived from a configured passphrase.
    Derived,
    /// Generated at startup; lost on restart.
    Ephemeral,
}

/// A 256-bit AES key, zeroized from memory on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct EncryptionKey {
    key: [u8; KEY_LENGTH],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key: bytes }
    }

    /// Parse 64 hex characters of key material.
    pub fn from_hex(value: &str) -> Result<Self> {
        let mut decoded = hex::decode(value.trim())
            .map_err(|e| PasteError::Config(format!("Encryption key is not valid hex: {}", e)))?;
        if decoded.len() != KEY_LENGTH {
            let len = decoded.len();
            decoded.zeroize();
            return Err(PasteError::Config(format!(
                "Encryption key must be exactly {} bytes (got {})",
                KEY_LENGTH, len
            )));
        }
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self { key })
    }

    /// Fresh random key material from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Derive a key from a passphrase using Argon2id.
    ///
    /// Same passphrase and salt always produce the same key, so the salt must
    /// stay fixed for the lifetime of a deployment.
    pub fn derive(passphrase: &str, salt: &[u8]) -> Result<Self> {
        if passphrase.trim().is_empty() {
            return Err(PasteError::InvalidInput(
                "Passphrase cannot be empty".to_string(),
            ));
        }
        if salt.len() < MIN_SALT_LENGTH {
            return Err(PasteError::InvalidInput(format!(
                "Salt must be at least {} bytes",
                MIN_SALT_LENGTH
            )));
        }

        let params = argon2::Params::new(
            ARGON2_MEMORY_KB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(KEY_LENGTH),
        )
        .map_err(|e| PasteError::Crypto(format!("Failed to create Argon2 params: {}", e)))?;
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let mut key = [0u8; KEY_LENGTH];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| PasteError::Crypto(format!("Key derivation failed: {}", e)))?;
        Ok(Self { key })
    }

    /// Resolve the process key from configuration.
    ///
    /// Raw key material wins over a passphrase; with neither, a key is
    /// generated.
    pub fn from_config(config: &EncryptionConfig) -> Result<(Self, KeySource)> {
        if let Some(raw) = &config.key {
            return Ok((Self::from_hex(raw.expose_secret())?, KeySource::Configured));
        }
        if let Some(passphrase) = &config.passphrase {
            let salt = config.salt.as_deref().unwrap_or(DEFAULT_SALT);
            return Ok((
                Self::derive(passphrase.expose_secret(), salt.as_bytes())?,
                KeySource::Derived,
            ));
        }
        Ok((Self::generate(), KeySource::Ephemeral))
    }

    /// Avoid storing or logging this value.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Hex form, for handing generated keys to an operator.
    pub fn to_hex(&self) -> String {
        hex::encode(self.key)
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_from_hex_round_trip() {
        let key = EncryptionKey::generate();
        let parsed = EncryptionKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        let result = EncryptionKey::from_hex("deadbeef");
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must be exactly 32 bytes"));
    }

    #[test]
    fn test_from_hex_rejects_non_hex() {
        assert!(EncryptionKey::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_derive_is_deterministic() {
        let salt = b"unique-salt-1234567890123456";
        let key1 = EncryptionKey::derive("operator-passphrase", salt).unwrap();
        let key2 = EncryptionKey::derive("operator-passphrase", salt).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());

        let other = EncryptionKey::derive("other-passphrase", salt).unwrap();
        assert_ne!(key1.as_bytes(), other.as_bytes());
    }

    #[test]
    fn test_derive_rejects_short_salt() {
        let result = EncryptionKey::derive("operator-passphrase", b"short");
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Salt must be at least 16 bytes"));
    }

    #[test]
    fn test_from_config_precedence() {
        let hex_key = EncryptionKey::generate().to_hex();
        let config = EncryptionConfig {
            enabled: true,
            key: Some(SecretString::from(hex_key.clone())),
            passphrase: Some(SecretString::from("ignored-passphrase".to_string())),
            salt: None,
        };
        let (key, source) = EncryptionKey::from_config(&config).unwrap();
        assert_eq!(source, KeySource::Configured);
        assert_eq!(key.to_hex(), hex_key);

        let (_, source) = EncryptionKey::from_config(&EncryptionConfig::default()).unwrap();
        assert_eq!(source, KeySource::Ephemeral);
    }

    #[test]
    fn test_debug_redacts() {
        let key = EncryptionKey::generate();
        let debug_output = format!("{:?}", key);
        assert!(debug_output.contains("REDACTED"));
        assert!(!debug_output.contains(&hex::encode(&key.as_bytes()[..4])));
    }
}
