//! Read-through Redis cache in front of another backend.
//!
//! Records are cached as JSON for a fixed TTL. The wrapped backend stays the
//! source of truth: every write goes there first and the cache entry is then
//! refreshed or dropped. Cache failures degrade to direct backend access.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::cache_store::RedisConnection;
use super::traits::StorageBackend;
use super::types::{Address, DocumentRecord};
use crate::config::{CacheConfig, StorageKind};
use crate::error::{PasteError, Result};
use crate::secret::SecretHash;

const KEY_PREFIX: &str = "paste-cache:";

pub struct ReadThroughCache {
    inner: Box<dyn StorageBackend>,
    connection: RedisConnection,
    ttl_secs: u64,
}

impl ReadThroughCache {
    pub fn new(inner: Box<dyn StorageBackend>, config: &CacheConfig) -> Result<Self> {
        Ok(Self {
            inner,
            connection: RedisConnection::new(config)?,
            ttl_secs: config.ttl().as_secs(),
        })
    }

    fn cache_key(address: &Address) -> String {
        format!("{}{}", KEY_PREFIX, address)
    }

    async fn cached(&self, address: &Address) -> Result<Option<DocumentRecord>> {
        let mut conn = self.connection.get()?;
        let value: Option<String> = redis::cmd("GET")
            .arg(Self::cache_key(address))
            .query_async(&mut conn)
            .await?;
        value
            .map(|json| serde_json::from_str(&json).map_err(Into::into))
            .transpose()
    }

    async fn store(&self, record: &DocumentRecord) {
        let result = async {
            let mut conn = self.connection.get()?;
            let json = serde_json::to_string(record)?;
            let _: () = redis::cmd("SET")
                .arg(Self::cache_key(&record.key))
                .arg(json)
                .arg("EX")
                .arg(self.ttl_secs)
                .query_async(&mut conn)
                .await?;
            Ok::<(), PasteError>(())
        }
        .await;
        if let Err(e) = result {
            warn!(address = %record.key, error = %e, "Failed to cache document");
        }
    }

    async fn invalidate(&self, address: &Address) {
        let result = async {
            let mut conn = self.connection.get()?;
            let _: i64 = redis::cmd("DEL")
                .arg(Self::cache_key(address))
                .query_async(&mut conn)
                .await?;
            Ok::<(), PasteError>(())
        }
        .await;
        if let Err(e) = result {
            warn!(address = %address, error = %e, "Failed to invalidate cached document");
        }
    }
}

#[async_trait]
impl StorageBackend for ReadThroughCache {
    fn kind(&self) -> StorageKind {
        self.inner.kind()
    }

    async fn prepare(&self) -> Result<()> {
        self.inner.prepare().await?;
        self.connection.connect().await?;
        info!(ttl_secs = self.ttl_secs, "Read-through cache enabled");
        Ok(())
    }

    async fn insert(&self, record: &DocumentRecord) -> Result<()> {
        self.inner.insert(record).await?;
        self.store(record).await;
        Ok(())
    }

    async fn fetch(&self, address: &Address) -> Result<Option<DocumentRecord>> {
        match self.cached(address).await {
            Ok(Some(record)) => {
                debug!(address = %address, "Cache hit");
                return Ok(Some(record));
            }
            Ok(None) => {}
            Err(e) => warn!(address = %address, error = %e, "Cache read failed"),
        }
        let record = self.inner.fetch(address).await?;
        if let Some(record) = &record {
            self.store(record).await;
        }
        Ok(record)
    }

    async fn touch(&self, record: &DocumentRecord) -> Result<()> {
        if let Err(e) = self.inner.touch(record).await {
            self.invalidate(&record.key).await;
            return Err(e);
        }
        self.store(record).await;
        Ok(())
    }

    async fn remove(&self, address: &Address) -> Result<bool> {
        let removed = self.inner.remove(address).await;
        self.invalidate(address).await;
        removed
    }

    async fn remove_if_secret(&self, address: &Address, secret: &SecretHash) -> Result<bool> {
        let removed = self.inner.remove_if_secret(address, secret).await?;
        if removed {
            self.invalidate(address).await;
        }
        Ok(removed)
    }

    fn native_expiry(&self) -> bool {
        self.inner.native_expiry()
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        // Cached copies of swept records age out with their TTL, and a stale
        // copy is still rejected by the expiry check on load.
        self.inner.sweep_expired(cutoff).await
    }

    async fn close(&self) -> Result<()> {
        self.connection.close()?;
        self.inner.close().await
    }
}
