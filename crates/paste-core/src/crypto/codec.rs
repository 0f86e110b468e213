//! Text encoding for storage.
//!
//! Encrypted text is stored as `<nonce-hex>:<tag-hex>:<ciphertext-hex>`. Input
//! that does not parse as such a triple is passed through untouched on
//! decrypt, so plaintext documents written before encryption was enabled stay
//! readable.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{Aes256Gcm, AesGcm};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::warn;

use super::key::{EncryptionKey, KeySource};
use crate::config::EncryptionConfig;
use crate::error::{PasteError, Result};

const NONCE_LENGTH: usize = 12;
/// Nonce size used by older deployments; accepted on decrypt only.
const LEGACY_NONCE_LENGTH: usize = 16;
const TAG_LENGTH: usize = 16;

type LegacyAes256Gcm = AesGcm<Aes256, U16>;

/// Stored form of a document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedText {
    pub text: String,
    pub is_encrypted: bool,
}

/// Applies the process encryption setting to document text.
#[derive(Debug, Clone)]
pub struct TextCodec {
    enabled: bool,
    key: EncryptionKey,
}

impl TextCodec {
    pub fn new(enabled: bool, key: EncryptionKey) -> Self {
        Self { enabled, key }
    }

    /// A codec that stores plaintext but can still decrypt nothing useful.
    ///
    /// The throwaway key only matters if an encrypted record shows up, which
    /// then fails its integrity check.
    pub fn plaintext() -> Self {
        Self::new(false, EncryptionKey::generate())
    }

    pub fn from_config(config: &EncryptionConfig) -> Result<Self> {
        let (key, source) = EncryptionKey::from_config(config)?;
        if config.enabled && source == KeySource::Ephemeral {
            warn!(
                "No encryption key configured; generated a temporary key. \
                 Documents encrypted now cannot be read after a restart"
            );
        }
        Ok(Self::new(config.enabled, key))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Prepare text for storage according to the current setting.
    pub fn encode(&self, text: &str) -> Result<EncodedText> {
        if !self.enabled {
            return Ok(EncodedText {
                text: text.to_string(),
                is_encrypted: false,
            });
        }
        Ok(EncodedText {
            text: self.encrypt(text)?,
            is_encrypted: true,
        })
    }

    /// Recover text from storage according to the record's own flag.
    pub fn decode(&self, stored: &str, is_encrypted: bool) -> Result<String> {
        if is_encrypted {
            self.decrypt(stored)
        } else {
            Ok(stored.to_string())
        }
    }

    pub fn encrypt(&self, text: &str) -> Result<String> {
        let cipher = Aes256Gcm::new_from_slice(self.key.as_bytes())
            .map_err(|e| PasteError::Crypto(format!("Failed to create cipher: {}", e)))?;

        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);

        let mut buffer = text.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut buffer)
            .map_err(|e| PasteError::Crypto(format!("Encryption failed: {}", e)))?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce),
            hex::encode(tag),
            hex::encode(&buffer)
        ))
    }

    /// Decrypt a stored triple.
    ///
    /// Non-triples come back unchanged. A well-formed triple that fails
    /// authentication is an integrity error, never garbage text.
    pub fn decrypt(&self, data: &str) -> Result<String> {
        let Some(parts) = EncryptedParts::parse(data) else {
            return Ok(data.to_string());
        };

        let mut buffer = parts.ciphertext;
        let tag = GenericArray::from_slice(&parts.tag);
        let verified = match parts.nonce.len() {
            NONCE_LENGTH => Aes256Gcm::new_from_slice(self.key.as_bytes())
                .map_err(|e| PasteError::Crypto(format!("Failed to create cipher: {}", e)))?
                .decrypt_in_place_detached(GenericArray::from_slice(&parts.nonce), b"", &mut buffer, tag),
            _ => LegacyAes256Gcm::new_from_slice(self.key.as_bytes())
                .map_err(|e| PasteError::Crypto(format!("Failed to create cipher: {}", e)))?
                .decrypt_in_place_detached(GenericArray::from_slice(&parts.nonce), b"", &mut buffer, tag),
        };
        verified.map_err(|_| {
            PasteError::Integrity("Document failed authentication; wrong key or tampered data".to_string())
        })?;

        String::from_utf8(buffer)
            .map_err(|_| PasteError::Integrity("Decrypted document is not valid UTF-8".to_string()))
    }
}

struct EncryptedParts {
    nonce: Vec<u8>,
    tag: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl EncryptedParts {
    fn parse(data: &str) -> Option<Self> {
        let mut fields = data.split(':');
        let nonce = hex::decode(fields.next()?).ok()?;
        let tag = hex::decode(fields.next()?).ok()?;
        let ciphertext = hex::decode(fields.next()?).ok()?;
        if fields.next().is_some() {
            return None;
        }
        if !matches!(nonce.len(), NONCE_LENGTH | LEGACY_NONCE_LENGTH) || tag.len() != TAG_LENGTH {
            return None;
        }
        Some(Self {
            nonce,
            tag,
            ciphertext,
        })
    }
}
