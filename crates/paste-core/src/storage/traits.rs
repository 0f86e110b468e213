//! Storage backend trait definition.
//!
//! A `StorageBackend` is a thin adapter over one persistence engine. It moves
//! `DocumentRecord`s in and out by address and knows nothing about keys,
//! encryption or expiry windows; `DocumentStorage` layers those on top so
//! every engine behaves the same.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{Address, DocumentRecord};
use crate::config::StorageKind;
use crate::error::Result;
use crate::secret::SecretHash;

/// Adapter interface for a single persistence engine.
///
/// All implementations must ensure:
/// - A record is either written completely or not at all
/// - `insert` never overwrites an existing record
/// - Records are addressed only by their hashed key
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Which engine this adapter drives.
    fn kind(&self) -> StorageKind;

    /// Idempotent setup: create the namespace and any native expiry index.
    ///
    /// # Errors
    ///
    /// Returns `PasteError::Storage` or `PasteError::Config` if the engine is
    /// unreachable or cannot be provisioned.
    async fn prepare(&self) -> Result<()>;

    /// Insert a new record.
    ///
    /// # Errors
    ///
    /// Returns `PasteError::Conflict` if the address is already occupied.
    async fn insert(&self, record: &DocumentRecord) -> Result<()>;

    /// Get a record by address.
    ///
    /// Returns `Ok(None)` if nothing is stored there.
    async fn fetch(&self, address: &Address) -> Result<Option<DocumentRecord>>;

    /// Persist a refreshed `last_accessed_at` and restart any native expiry.
    async fn touch(&self, record: &DocumentRecord) -> Result<()>;

    /// Remove a record unconditionally.
    ///
    /// Returns whether a record was removed.
    async fn remove(&self, address: &Address) -> Result<bool>;

    /// Remove a record only if its stored secret digest matches.
    ///
    /// Returns `false` both when nothing is stored and when the digest
    /// differs. Engines with a conditional delete should override this.
    async fn remove_if_secret(&self, address: &Address, secret: &SecretHash) -> Result<bool> {
        match self.fetch(address).await? {
            Some(record) if record.delete_secret_hash.matches(secret) => self.remove(address).await,
            _ => Ok(false),
        }
    }

    /// Whether the engine evicts expired records on its own.
    fn native_expiry(&self) -> bool {
        false
    }

    /// Remove non-static records last read before `cutoff`.
    ///
    /// Returns the number of records removed.
    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Release connections and handles. The backend is unusable afterwards.
    async fn close(&self) -> Result<()>;
}
