//! Document storage: the contract every backend is driven through.
//!
//! `DocumentStorage` applies hash-before-store addressing, the text codec and
//! the sliding expiry policy on top of a single `StorageBackend`, so callers
//! see identical behavior whichever engine is configured.
//!
//! Persistence failures are logged and reported as `false` or absent, never
//! as errors. The one exception is a stored ciphertext that fails
//! authentication, which `load` surfaces as `PasteError::Integrity`.

pub mod arango;
pub mod cache_store;
pub mod file;
pub mod read_through;
pub mod sqlite;
pub mod traits;
pub mod types;

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{StorageConfig, StorageKind};
use crate::crypto::TextCodec;
use crate::error::{PasteError, Result};
use crate::expiry::ExpiryPolicy;
use crate::secret::SecretHash;

pub use arango::ArangoBackend;
pub use cache_store::RedisBackend;
pub use file::FileBackend;
pub use read_through::ReadThroughCache;
pub use sqlite::SqliteBackend;
pub use traits::StorageBackend;
pub use types::{Address, DocumentRecord};

/// The storage contract over one backend.
pub struct DocumentStorage {
    backend: Box<dyn StorageBackend>,
    codec: TextCodec,
    policy: ExpiryPolicy,
    clock: Arc<dyn Clock>,
}

impl DocumentStorage {
    pub fn new(backend: Box<dyn StorageBackend>, codec: TextCodec, policy: ExpiryPolicy) -> Self {
        Self {
            backend,
            codec,
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source used for access stamps and expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn kind(&self) -> StorageKind {
        self.backend.kind()
    }

    pub fn policy(&self) -> ExpiryPolicy {
        self.policy
    }

    pub fn codec(&self) -> &TextCodec {
        &self.codec
    }

    /// Idempotent backend setup. Failures propagate.
    pub async fn prepare(&self) -> Result<()> {
        self.backend.prepare().await
    }

    /// Insert a new document, reporting why it failed.
    ///
    /// # Errors
    ///
    /// Returns `PasteError::Conflict` if a document already lives at `key`.
    pub async fn try_save(
        &self,
        key: &str,
        delete_secret_hash: &SecretHash,
        text: &str,
        is_static: bool,
    ) -> Result<()> {
        let encoded = self.codec.encode(text)?;
        let now = self.clock.now();
        let record = DocumentRecord {
            key: Address::for_key(key),
            delete_secret_hash: delete_secret_hash.clone(),
            text: encoded.text,
            is_static,
            is_encrypted: encoded.is_encrypted,
            last_accessed_at: if is_static { None } else { Some(now) },
            created_at: Some(now),
        };
        self.backend.insert(&record).await?;
        debug!(address = %record.key, is_static, encrypted = record.is_encrypted, "Saved document");
        Ok(())
    }

    /// Insert a new document. Returns `false` on any failure.
    pub async fn save(
        &self,
        key: &str,
        delete_secret_hash: &SecretHash,
        text: &str,
        is_static: bool,
    ) -> bool {
        match self.try_save(key, delete_secret_hash, text, is_static).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to save document");
                false
            }
        }
    }

    /// Read a document's plaintext and restart its expiry window.
    ///
    /// Returns `Ok(None)` when the document is missing, expired or
    /// unreadable.
    ///
    /// # Errors
    ///
    /// Returns `PasteError::Integrity` if the stored ciphertext fails
    /// authentication.
    pub async fn load(&self, key: &str) -> Result<Option<String>> {
        let address = Address::for_key(key);
        let record = match self.backend.fetch(&address).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(address = %address, "Document not found");
                return Ok(None);
            }
            Err(e) => {
                warn!(address = %address, error = %e, "Failed to load document");
                return Ok(None);
            }
        };

        let now = self.clock.now();
        if self
            .policy
            .is_expired(record.is_static, record.last_accessed_at, now)
        {
            debug!(address = %address, "Document expired");
            if let Err(e) = self.backend.remove(&address).await {
                warn!(address = %address, error = %e, "Failed to remove expired document");
            }
            return Ok(None);
        }

        let text = match self.codec.decode(&record.text, record.is_encrypted) {
            Ok(text) => text,
            Err(e) if e.is_integrity() => {
                error!(address = %address, error = %e, "Stored document failed integrity check");
                return Err(e);
            }
            Err(e) => {
                warn!(address = %address, error = %e, "Failed to decode document");
                return Ok(None);
            }
        };

        if !record.is_static {
            let refreshed = DocumentRecord {
                last_accessed_at: Some(now),
                ..record
            };
            if let Err(e) = self.backend.touch(&refreshed).await {
                warn!(address = %address, error = %e, "Failed to refresh document access time");
                return Ok(None);
            }
        }

        debug!(address = %address, "Loaded document");
        Ok(Some(text))
    }

    /// Remove a document if `secret` matches its stored digest.
    ///
    /// A missing document and a wrong secret both return `false`.
    pub async fn delete_by_secret(&self, key: &str, secret: &SecretHash) -> bool {
        let address = Address::for_key(key);
        match self.backend.remove_if_secret(&address, secret).await {
            Ok(removed) => {
                debug!(address = %address, removed, "Delete by secret");
                removed
            }
            Err(e) => {
                warn!(address = %address, error = %e, "Failed to delete document");
                false
            }
        }
    }

    /// Remove a document unconditionally. For trusted callers only.
    pub async fn delete(&self, key: &str) -> bool {
        let address = Address::for_key(key);
        match self.backend.remove(&address).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(address = %address, error = %e, "Failed to delete document");
                false
            }
        }
    }

    /// Reclaim expired documents. A no-op for engines with native expiry.
    pub async fn sweep_expired(&self) -> Result<usize> {
        if self.backend.native_expiry() {
            return Ok(0);
        }
        let cutoff = self.policy.cutoff(self.clock.now());
        let removed = self.backend.sweep_expired(cutoff).await?;
        if removed > 0 {
            info!(removed, kind = %self.kind(), "Swept expired documents");
        }
        Ok(removed)
    }

    pub async fn close(&self) -> Result<()> {
        self.backend.close().await
    }
}

/// Build the configured backend, prepare it, and wrap it in the contract.
///
/// # Errors
///
/// Returns an error if configuration is invalid or setup fails; the caller
/// decides whether to abort.
pub async fn open(config: &StorageConfig, codec: TextCodec) -> Result<DocumentStorage> {
    config.validate()?;
    let policy = ExpiryPolicy::new(config.expiry_window());

    let mut backend: Box<dyn StorageBackend> = match config.kind {
        StorageKind::File => Box::new(FileBackend::new(&config.path)),
        StorageKind::Relational => Box::new(SqliteBackend::new(config.sqlite_path())),
        StorageKind::Document => Box::new(ArangoBackend::from_config(config, policy)?),
        StorageKind::Cache => Box::new(RedisBackend::from_config(&config.cache, policy)?),
    };
    if config.cache.enabled {
        if config.kind == StorageKind::Cache {
            debug!("Read-through cache skipped; the backend is already the cache store");
        } else {
            backend = Box::new(ReadThroughCache::new(backend, &config.cache)?);
        }
    }

    let storage = DocumentStorage::new(backend, codec, policy);
    storage.prepare().await.map_err(|e| match e {
        PasteError::Config(_) => e,
        other => PasteError::Storage(format!(
            "Failed to prepare {} storage: {}",
            config.kind, other
        )),
    })?;
    info!(kind = %config.kind, "Storage ready");
    Ok(storage)
}
