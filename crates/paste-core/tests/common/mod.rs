//! Storage contract checks shared by every backend's test suite.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use paste_core::storage::{Address, DocumentRecord, DocumentStorage, StorageBackend};
use paste_core::{hash_secret, EncryptionKey, ManualClock, PasteError, TextCodec};
use tempfile::TempDir;

pub const WINDOW_SECS: i64 = 60;

pub type BackendFactory = fn(&Path) -> Box<dyn StorageBackend>;

pub struct Harness {
    dir: TempDir,
    factory: BackendFactory,
    prefix: String,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(factory: BackendFactory) -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir should be created"),
            factory,
            prefix: String::new(),
            // Millisecond precision survives every backend's timestamp encoding.
            clock: Arc::new(ManualClock::new(Utc::now().trunc_subsecs(3))),
        }
    }

    /// Namespace keys so runs against a shared server never collide.
    pub fn with_unique_keys(mut self) -> Self {
        self.prefix = format!("{}-", uuid::Uuid::new_v4().simple());
        self
    }

    /// Directory handed to the backend factory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub async fn storage(&self, codec: TextCodec) -> DocumentStorage {
        let storage = DocumentStorage::new(
            (self.factory)(self.dir.path()),
            codec,
            paste_core::ExpiryPolicy::new(Duration::from_secs(WINDOW_SECS as u64)),
        )
        .with_clock(self.clock.clone());
        storage.prepare().await.expect("prepare should succeed");
        storage
    }

    pub async fn plaintext(&self) -> DocumentStorage {
        self.storage(TextCodec::plaintext()).await
    }

    /// A second handle on the same store, bypassing the contract.
    pub async fn raw(&self) -> Box<dyn StorageBackend> {
        let backend = (self.factory)(self.dir.path());
        backend.prepare().await.expect("prepare should succeed");
        backend
    }

    pub async fn raw_record(&self, key: &str) -> Option<DocumentRecord> {
        self.raw()
            .await
            .fetch(&Address::for_key(key))
            .await
            .expect("raw fetch should succeed")
    }

    pub fn advance(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }
}

pub async fn scenario_round_trip_and_delete(h: &Harness) {
    let storage = h.plaintext().await;
    let key = h.key("abc123");

    assert!(storage.save(&key, &hash_secret("s3cr3t"), "hello world", false).await);
    assert_eq!(
        storage.load(&key).await.expect("load should succeed").as_deref(),
        Some("hello world")
    );
    assert!(!storage.delete_by_secret(&key, &hash_secret("wrong")).await);
    assert!(storage.delete_by_secret(&key, &hash_secret("s3cr3t")).await);
    assert_eq!(storage.load(&key).await.expect("load should succeed"), None);
}

pub async fn unknown_key_is_absent(h: &Harness) {
    let storage = h.plaintext().await;
    assert_eq!(
        storage.load(&h.key("never-saved")).await.expect("load should succeed"),
        None
    );
    assert!(!storage.delete_by_secret(&h.key("never-saved"), &hash_secret("x")).await);
    assert!(!storage.delete(&h.key("never-saved")).await);
}

pub async fn wrong_secret_leaves_document(h: &Harness) {
    let storage = h.plaintext().await;
    let key = h.key("guarded");
    assert!(storage.save(&key, &hash_secret("right"), "payload", false).await);

    for attempt in ["wrong", "", "right "] {
        assert!(!storage.delete_by_secret(&key, &hash_secret(attempt)).await);
    }
    assert_eq!(
        storage.load(&key).await.expect("load should succeed").as_deref(),
        Some("payload")
    );
}

pub async fn delete_succeeds_exactly_once(h: &Harness) {
    let storage = h.plaintext().await;
    let key = h.key("once");
    assert!(storage.save(&key, &hash_secret("s3cr3t"), "payload", false).await);

    assert!(storage.delete_by_secret(&key, &hash_secret("s3cr3t")).await);
    assert!(!storage.delete_by_secret(&key, &hash_secret("s3cr3t")).await);
}

pub async fn unconditional_delete(h: &Harness) {
    let storage = h.plaintext().await;
    let key = h.key("trusted");
    assert!(storage.save(&key, &hash_secret("s3cr3t"), "payload", true).await);

    assert!(storage.delete(&key).await);
    assert!(!storage.delete(&key).await);
    assert_eq!(storage.load(&key).await.expect("load should succeed"), None);
}

pub async fn duplicate_save_keeps_original(h: &Harness) {
    let storage = h.plaintext().await;
    let key = h.key("taken");
    assert!(storage.save(&key, &hash_secret("first"), "original", false).await);

    assert!(!storage.save(&key, &hash_secret("second"), "replacement", false).await);
    let err = storage
        .try_save(&key, &hash_secret("second"), "replacement", false)
        .await
        .expect_err("occupied address should be refused");
    assert!(matches!(err, PasteError::Conflict(_)));

    assert_eq!(
        storage.load(&key).await.expect("load should succeed").as_deref(),
        Some("original")
    );
    assert!(storage.delete_by_secret(&key, &hash_secret("first")).await);
}

pub async fn records_are_filed_by_hashed_key(h: &Harness) {
    let storage = h.plaintext().await;
    let key = h.key("addressed");
    assert!(storage.save(&key, &hash_secret("s3cr3t"), "payload", false).await);

    let record = h.raw_record(&key).await.expect("record should be stored");
    assert_eq!(record.key, Address::for_key(&key));
    assert_ne!(record.key.as_str(), key);
    assert_eq!(record.delete_secret_hash, hash_secret("s3cr3t"));
    assert!(record.created_at.is_some());
}

pub async fn static_documents_are_never_touched(h: &Harness) {
    let storage = h.plaintext().await;
    let key = h.key("pinned");
    assert!(storage.save(&key, &hash_secret("s3cr3t"), "forever", true).await);
    let before = h.raw_record(&key).await.expect("record should be stored");
    assert_eq!(before.last_accessed_at, None);

    for _ in 0..3 {
        h.advance(WINDOW_SECS * 10);
        assert_eq!(
            storage.load(&key).await.expect("load should succeed").as_deref(),
            Some("forever")
        );
    }

    let after = h.raw_record(&key).await.expect("record should remain");
    assert_eq!(after.last_accessed_at, None);
    assert!(after.is_static);
}

pub async fn reads_slide_the_expiry_window(h: &Harness) {
    let storage = h.plaintext().await;
    let key = h.key("sliding");
    assert!(storage.save(&key, &hash_secret("s3cr3t"), "payload", false).await);
    let saved_at = h.raw_record(&key).await.and_then(|r| r.last_accessed_at);

    // Each read lands inside the window and restarts it, so the document
    // outlives several windows measured from creation.
    for _ in 0..3 {
        h.advance(WINDOW_SECS - 10);
        assert!(storage.load(&key).await.expect("load should succeed").is_some());
    }
    let touched_at = h.raw_record(&key).await.and_then(|r| r.last_accessed_at);
    assert!(touched_at > saved_at);
    assert_eq!(touched_at, Some(paste_core::Clock::now(h.clock.as_ref())));

    h.advance(WINDOW_SECS + 1);
    assert_eq!(storage.load(&key).await.expect("load should succeed"), None);
    assert!(h.raw_record(&key).await.is_none());
}

pub async fn failed_reads_do_not_slide_the_window(h: &Harness) {
    let storage = h.plaintext().await;
    let key = h.key("untouched");
    assert!(storage.save(&key, &hash_secret("s3cr3t"), "payload", false).await);
    let saved_at = h.raw_record(&key).await.and_then(|r| r.last_accessed_at);

    h.advance(WINDOW_SECS - 10);
    assert!(!storage.delete_by_secret(&key, &hash_secret("wrong")).await);
    assert_eq!(
        storage.load(&h.key("untouched-typo")).await.expect("load should succeed"),
        None
    );

    let still = h.raw_record(&key).await.and_then(|r| r.last_accessed_at);
    assert_eq!(still, saved_at);
}

pub async fn encryption_toggle_keeps_documents_readable(h: &Harness) {
    let key_material = EncryptionKey::generate();
    let encrypting = h
        .storage(TextCodec::new(true, key_material.clone()))
        .await;
    let plain = h.storage(TextCodec::new(false, key_material)).await;
    let sealed_key = h.key("sealed");
    let open_key = h.key("open");

    assert!(encrypting.save(&sealed_key, &hash_secret("a"), "secret text", false).await);
    assert!(plain.save(&open_key, &hash_secret("b"), "open text", false).await);

    for storage in [&encrypting, &plain] {
        assert_eq!(
            storage.load(&sealed_key).await.expect("load should succeed").as_deref(),
            Some("secret text")
        );
        assert_eq!(
            storage.load(&open_key).await.expect("load should succeed").as_deref(),
            Some("open text")
        );
    }
}

pub async fn encrypted_text_is_stored_as_triple(h: &Harness) {
    let storage = h
        .storage(TextCodec::new(true, EncryptionKey::generate()))
        .await;
    let key = h.key("triple");
    assert!(storage.save(&key, &hash_secret("s3cr3t"), "hello world", false).await);

    let record = h.raw_record(&key).await.expect("record should be stored");
    assert!(record.is_encrypted);
    assert_ne!(record.text, "hello world");
    let fields: Vec<&str> = record.text.split(':').collect();
    assert_eq!(fields.len(), 3);
    assert!(fields
        .iter()
        .all(|f| !f.is_empty() && f.chars().all(|c| c.is_ascii_hexdigit())));

    assert_eq!(
        storage.load(&key).await.expect("load should succeed").as_deref(),
        Some("hello world")
    );
}

pub async fn tampered_ciphertext_is_an_integrity_error(h: &Harness) {
    let storage = h
        .storage(TextCodec::new(true, EncryptionKey::generate()))
        .await;
    let key = h.key("tampered");
    assert!(storage.save(&key, &hash_secret("s3cr3t"), "hello world", true).await);

    let raw = h.raw().await;
    let mut record = h.raw_record(&key).await.expect("record should be stored");
    let mut fields: Vec<String> = record.text.split(':').map(str::to_string).collect();
    let flipped = if fields[2].starts_with('0') { "1" } else { "0" };
    fields[2].replace_range(0..1, flipped);
    record.text = fields.join(":");
    assert!(raw.remove(&record.key).await.expect("remove should succeed"));
    raw.insert(&record).await.expect("insert should succeed");

    let err = storage
        .load(&key)
        .await
        .expect_err("tampered text must not be served");
    assert!(err.is_integrity());
}

pub async fn close_releases_backend(h: &Harness) {
    let storage = h.plaintext().await;
    storage.close().await.expect("close should succeed");
}

/// Touches race last-writer-wins; concurrent readers all get the text.
pub async fn concurrent_reads_race_benignly(h: &Harness) {
    let storage = h.plaintext().await;
    let key = h.key("contended");
    assert!(storage.save(&key, &hash_secret("s3cr3t"), "payload", false).await);
    h.advance(5);

    let (first, second) = tokio::join!(storage.load(&key), storage.load(&key));
    assert_eq!(first.expect("load should succeed").as_deref(), Some("payload"));
    assert_eq!(second.expect("load should succeed").as_deref(), Some("payload"));

    let record = h.raw_record(&key).await.expect("record should remain");
    assert_eq!(
        record.last_accessed_at,
        Some(paste_core::Clock::now(h.clock.as_ref()))
    );
}

/// A touch that loses the race against a delete must not bring the record back.
pub async fn late_touch_does_not_resurrect(h: &Harness) {
    let storage = h.plaintext().await;
    let key = h.key("raced");
    assert!(storage.save(&key, &hash_secret("s3cr3t"), "payload", false).await);

    let raw = h.raw().await;
    let stale = h.raw_record(&key).await.expect("record should be stored");
    assert!(storage.delete_by_secret(&key, &hash_secret("s3cr3t")).await);

    assert!(raw.touch(&stale).await.is_err());
    assert!(h.raw_record(&key).await.is_none());
}
