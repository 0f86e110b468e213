//! Core data types for document persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::secret::SecretHash;

/// Storage address of a document: hex SHA-256 of its lookup key.
///
/// Every backend files documents under this form, never the raw key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn for_key(key: &str) -> Self {
        Self(hex::encode(Sha256::digest(key.as_bytes())))
    }

    /// Wrap an address read back from storage.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `value` has the shape of an address: 64 lowercase hex digits.
    pub fn is_well_formed(value: &str) -> bool {
        value.len() == 64
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    fn empty() -> Self {
        Self(String::new())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted document, as every backend stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    /// Hashed lookup key.
    #[serde(default = "Address::empty")]
    pub key: Address,
    #[serde(alias = "deleteSecret")]
    pub delete_secret_hash: SecretHash,
    /// Plaintext, or the encrypted triple when `is_encrypted`.
    pub text: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_encrypted: bool,
    /// Absent for static documents.
    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::hash_secret;

    #[test]
    fn test_address_is_sha256_of_key() {
        let address = Address::for_key("abc");
        assert_eq!(
            address.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(address, Address::for_key("abd"));
    }

    #[test]
    fn test_address_shape() {
        assert!(Address::is_well_formed(Address::for_key("abc123").as_str()));
        assert!(!Address::is_well_formed("abc123"));
        assert!(!Address::is_well_formed(&"A".repeat(64)));
        assert!(!Address::is_well_formed("pasteServer.sqlite3"));
    }

    #[test]
    fn test_record_json_shape() {
        let record = DocumentRecord {
            key: Address::for_key("abc123"),
            delete_secret_hash: hash_secret("s3cr3t"),
            text: "hello".to_string(),
            is_static: false,
            is_encrypted: false,
            last_accessed_at: None,
            created_at: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("deleteSecretHash").is_some());
        assert!(json.get("isStatic").is_some());
        assert!(json.get("lastAccessedAt").is_some());
    }

    #[test]
    fn test_legacy_record_loads() {
        // Older files carried only the secret digest, text and static flag.
        let json = r#"{"deleteSecret": "abcd", "text": "hi", "isStatic": true}"#;
        let record: DocumentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.delete_secret_hash.as_str(), "abcd");
        assert!(record.is_static);
        assert!(!record.is_encrypted);
        assert!(record.last_accessed_at.is_none());
        assert_eq!(record.key.as_str(), "");
    }
}
