//! The create/fetch/delete flow a front end drives.
//!
//! Mints keys and secrets, enforces the size limit, hashes secrets before
//! they reach storage, and retries on the rare key collision.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{PasteError, Result};
use crate::keys::KeyGenerator;
use crate::secret::{hash_secret, DeleteSecret};
use crate::storage::DocumentStorage;

/// Fresh keys tried before a create gives up.
const MAX_KEY_ATTEMPTS: usize = 3;

/// What the creator of a document gets back, once.
#[derive(Debug)]
pub struct CreatedPaste {
    pub key: String,
    pub delete_secret: DeleteSecret,
}

pub struct PasteService {
    storage: Arc<DocumentStorage>,
    keys: KeyGenerator,
    max_length: usize,
}

impl PasteService {
    pub fn new(storage: Arc<DocumentStorage>, keys: KeyGenerator, max_length: usize) -> Self {
        Self {
            storage,
            keys,
            max_length,
        }
    }

    pub fn storage(&self) -> &Arc<DocumentStorage> {
        &self.storage
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn validate_text(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Err(PasteError::InvalidInput(
                "You have to enter the text of the paste".to_string(),
            ));
        }
        if text.len() >= self.max_length {
            return Err(PasteError::InvalidInput(format!(
                "Text too long (max. {})",
                self.max_length
            )));
        }
        Ok(())
    }

    /// Store `text` under a freshly minted key.
    ///
    /// # Errors
    ///
    /// Returns `PasteError::InvalidInput` for empty or oversized text and
    /// `PasteError::Storage` if the document could not be saved.
    pub async fn create(&self, text: &str) -> Result<CreatedPaste> {
        self.validate_text(text)?;

        for attempt in 1..=MAX_KEY_ATTEMPTS {
            let key = self.keys.generate_key();
            let delete_secret = self.keys.generate_secret();
            match self
                .storage
                .try_save(&key, &delete_secret.hash(), text, false)
                .await
            {
                Ok(()) => {
                    info!(key = %key, "Created document");
                    return Ok(CreatedPaste { key, delete_secret });
                }
                Err(PasteError::Conflict(_)) => {
                    debug!(attempt, "Key collision; minting another key");
                }
                Err(e) => {
                    warn!(error = %e, "Failed to save document");
                    return Err(PasteError::Storage("Failed to save document".to_string()));
                }
            }
        }

        warn!(attempts = MAX_KEY_ATTEMPTS, "Every minted key collided");
        Err(PasteError::Storage("Failed to save document".to_string()))
    }

    /// Store a static document under a caller-chosen key.
    ///
    /// Static documents never expire and their access time is never tracked.
    pub async fn create_static(&self, key: &str, text: &str) -> Result<CreatedPaste> {
        if key.trim().is_empty() {
            return Err(PasteError::InvalidInput("Key cannot be empty".to_string()));
        }
        self.validate_text(text)?;

        let delete_secret = self.keys.generate_secret();
        match self
            .storage
            .try_save(key, &delete_secret.hash(), text, true)
            .await
        {
            Ok(()) => {
                info!(key = %key, "Created static document");
                Ok(CreatedPaste {
                    key: key.to_string(),
                    delete_secret,
                })
            }
            Err(PasteError::Conflict(_)) => Err(PasteError::Conflict(format!(
                "A document with key {} already exists",
                key
            ))),
            Err(e) => {
                warn!(error = %e, "Failed to save static document");
                Err(PasteError::Storage("Failed to save document".to_string()))
            }
        }
    }

    /// Read a document, restarting its expiry window.
    pub async fn fetch(&self, key: &str) -> Result<Option<String>> {
        let text = self.storage.load(key).await?;
        if text.is_some() {
            debug!(key = %key, "Sending document");
        }
        Ok(text)
    }

    /// Delete a document with the raw secret handed out at creation.
    ///
    /// Returns `false` for a wrong secret and for a missing document alike.
    pub async fn delete(&self, key: &str, raw_secret: &str) -> bool {
        if raw_secret.is_empty() {
            return false;
        }
        let deleted = self
            .storage
            .delete_by_secret(key, &hash_secret(raw_secret))
            .await;
        if deleted {
            info!(key = %key, "Deleted document");
        }
        deleted
    }

    /// Delete without a secret. Never expose this to untrusted callers.
    pub async fn remove(&self, key: &str) -> bool {
        let removed = self.storage.delete(key).await;
        if removed {
            info!(key = %key, "Removed document");
        }
        removed
    }
}
