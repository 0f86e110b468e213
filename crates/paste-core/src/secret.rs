//! Delete secrets and their one-way digests.
//!
//! A delete secret is shown to its creator exactly once; storage only ever
//! sees the SHA-256 digest. Keys and secrets are deliberately distinct types
//! so one can never be passed where the other is expected.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// A raw delete secret.
pub struct DeleteSecret(SecretString);

impl DeleteSecret {
    pub(crate) fn new(raw: String) -> Self {
        Self(SecretString::from(raw))
    }

    /// The raw secret, for one-time display to the document's creator.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Digest suitable for persistence and comparison.
    pub fn hash(&self) -> SecretHash {
        hash_secret(self.expose())
    }
}

impl fmt::Debug for DeleteSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeleteSecret").field(&"[REDACTED]").finish()
    }
}

/// Lowercase hex SHA-256 digest of a delete secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretHash(String);

impl SecretHash {
    /// Wrap a digest read back from storage.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against another digest.
    pub fn matches(&self, other: &SecretHash) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretHash").field(&"[REDACTED]").finish()
    }
}

/// Hash a raw delete secret with the fixed one-way digest.
pub fn hash_secret(raw: &str) -> SecretHash {
    SecretHash(hex::encode(Sha256::digest(raw.as_bytes())))
}
