//! Error types for paste core operations.
//!
//! Errors are descriptive at the core level. The storage contract swallows
//! persistence failures into `false`/absent results after logging them; the
//! CLI maps whatever does surface to user-facing messages.

use thiserror::Error;

/// Result type alias for paste operations.
pub type Result<T> = std::result::Result<T, PasteError>;

/// Core error type for paste operations.
#[derive(Debug, Error)]
pub enum PasteError {
    /// Encryption setup or encoding error
    #[error("Encryption error: {0}")]
    Crypto(String),

    /// Stored ciphertext parsed but failed verification
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// A document already occupies the address
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error (fallback)
    #[error("{0}")]
    Other(String),
}

impl PasteError {
    /// Whether this error is a decryption integrity failure.
    pub fn is_integrity(&self) -> bool {
        matches!(self, PasteError::Integrity(_))
    }
}

impl From<std::io::Error> for PasteError {
    fn from(err: std::io::Error) -> Self {
        PasteError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PasteError {
    fn from(err: serde_json::Error) -> Self {
        PasteError::Storage(format!("Malformed record: {}", err))
    }
}

impl From<rusqlite::Error> for PasteError {
    fn from(err: rusqlite::Error) -> Self {
        PasteError::Storage(format!("SQLite error: {}", err))
    }
}

impl From<reqwest::Error> for PasteError {
    fn from(err: reqwest::Error) -> Self {
        PasteError::Storage(format!("HTTP error: {}", err))
    }
}

impl From<redis::RedisError> for PasteError {
    fn from(err: redis::RedisError) -> Self {
        PasteError::Storage(format!("Redis error: {}", err))
    }
}

impl From<tokio::task::JoinError> for PasteError {
    fn from(err: tokio::task::JoinError) -> Self {
        PasteError::Storage(format!("Blocking task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_map_to_storage() {
        let err: PasteError = std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
        assert!(matches!(err, PasteError::Storage(_)));
        assert!(err.to_string().contains("disk gone"));
    }

    #[test]
    fn test_integrity_is_distinguishable() {
        assert!(PasteError::Integrity("bad tag".into()).is_integrity());
        assert!(!PasteError::Crypto("bad key".into()).is_integrity());
    }
}
