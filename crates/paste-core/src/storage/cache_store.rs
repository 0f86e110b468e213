//! Cache-store backend on Redis.
//!
//! Each document is a hash at `paste:{address}`. Writes that must be atomic
//! run as Lua scripts: create-if-absent on insert, touch-if-present on read,
//! and compare-and-delete for secret-checked removal. Expiry is native: every
//! insert and touch of a non-static document resets the key's `EXPIRE`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, Script};
use secrecy::ExposeSecret;
use tracing::{debug, info};

use super::traits::StorageBackend;
use super::types::{Address, DocumentRecord};
use crate::config::{CacheConfig, StorageKind};
use crate::error::{PasteError, Result};
use crate::expiry::ExpiryPolicy;
use crate::secret::SecretHash;

const KEY_PREFIX: &str = "paste:";

const INSERT_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1],
    'deleteSecretHash', ARGV[1],
    'text', ARGV[2],
    'isStatic', ARGV[3],
    'isEncrypted', ARGV[4],
    'lastAccessedAt', ARGV[5],
    'createdAt', ARGV[6])
local ttl = tonumber(ARGV[7])
if ttl > 0 then
    redis.call('EXPIRE', KEYS[1], ttl)
end
return 1
";

const TOUCH_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('HSET', KEYS[1], 'lastAccessedAt', ARGV[1])
redis.call('EXPIRE', KEYS[1], tonumber(ARGV[2]))
return 1
";

const DELETE_IF_SECRET_SCRIPT: &str = r"
local stored = redis.call('HGET', KEYS[1], 'deleteSecretHash')
if not stored then
    stored = redis.call('HGET', KEYS[1], 'deleteSecret')
end
if stored == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// A lazily established, shared Redis connection.
///
/// `ConnectionManager` reconnects on its own; clones share one multiplexed
/// connection.
pub(crate) struct RedisConnection {
    client: redis::Client,
    manager: Mutex<Option<ConnectionManager>>,
}

impl RedisConnection {
    pub(crate) fn new(config: &CacheConfig) -> Result<Self> {
        let client = redis::Client::open(connection_info(config))
            .map_err(|e| PasteError::Config(format!("Invalid Redis settings: {}", e)))?;
        Ok(Self {
            client,
            manager: Mutex::new(None),
        })
    }

    /// Connect if needed and check the server answers.
    pub(crate) async fn connect(&self) -> Result<()> {
        let mut conn = match self.current()? {
            Some(conn) => conn,
            None => {
                let conn = ConnectionManager::new(self.client.clone()).await?;
                *self.lock()? = Some(conn.clone());
                conn
            }
        };
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(reply = %pong, "Redis answered");
        Ok(())
    }

    pub(crate) fn get(&self) -> Result<ConnectionManager> {
        self.current()?
            .ok_or_else(|| PasteError::Storage("Redis connection is not open".to_string()))
    }

    pub(crate) fn close(&self) -> Result<()> {
        self.lock()?.take();
        Ok(())
    }

    fn current(&self) -> Result<Option<ConnectionManager>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<ConnectionManager>>> {
        self.manager
            .lock()
            .map_err(|_| PasteError::Storage("Redis connection poisoned".to_string()))
    }
}

pub(crate) fn connection_info(config: &CacheConfig) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
        redis: RedisConnectionInfo {
            password: config
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_string()),
            ..RedisConnectionInfo::default()
        },
    }
}

fn format_timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Accepts RFC 3339 and, from older deployments, epoch milliseconds.
fn parse_timestamp(value: Option<&String>) -> Option<DateTime<Utc>> {
    let raw = value?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(millis) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn record_from_hash(address: &Address, mut fields: HashMap<String, String>) -> Result<DocumentRecord> {
    let secret = fields
        .remove("deleteSecretHash")
        .or_else(|| fields.remove("deleteSecret"))
        .ok_or_else(|| PasteError::Storage("Malformed record: missing secret digest".to_string()))?;
    let text = fields
        .remove("text")
        .ok_or_else(|| PasteError::Storage("Malformed record: missing text".to_string()))?;
    Ok(DocumentRecord {
        key: address.clone(),
        delete_secret_hash: SecretHash::from_stored(secret),
        text,
        is_static: fields.get("isStatic").map(|v| v == "1").unwrap_or(false),
        is_encrypted: fields.get("isEncrypted").map(|v| v == "1").unwrap_or(false),
        last_accessed_at: parse_timestamp(fields.get("lastAccessedAt")),
        created_at: parse_timestamp(fields.get("createdAt")),
    })
}

pub struct RedisBackend {
    connection: RedisConnection,
    ttl_secs: u64,
    insert_script: Script,
    touch_script: Script,
    delete_script: Script,
}

impl RedisBackend {
    pub fn from_config(config: &CacheConfig, policy: ExpiryPolicy) -> Result<Self> {
        Ok(Self {
            connection: RedisConnection::new(config)?,
            ttl_secs: policy.window_secs(),
            insert_script: Script::new(INSERT_SCRIPT),
            touch_script: Script::new(TOUCH_SCRIPT),
            delete_script: Script::new(DELETE_IF_SECRET_SCRIPT),
        })
    }

    fn redis_key(address: &Address) -> String {
        format!("{}{}", KEY_PREFIX, address)
    }
}

#[async_trait]
impl StorageBackend for RedisBackend {
    fn kind(&self) -> StorageKind {
        StorageKind::Cache
    }

    async fn prepare(&self) -> Result<()> {
        self.connection.connect().await?;
        info!(ttl_secs = self.ttl_secs, "Cache storage prepared");
        Ok(())
    }

    async fn insert(&self, record: &DocumentRecord) -> Result<()> {
        let mut conn = self.connection.get()?;
        let ttl = if record.is_static { 0 } else { self.ttl_secs };
        let created: i64 = self
            .insert_script
            .key(Self::redis_key(&record.key))
            .arg(record.delete_secret_hash.as_str())
            .arg(record.text.as_str())
            .arg(flag(record.is_static))
            .arg(flag(record.is_encrypted))
            .arg(format_timestamp(record.last_accessed_at))
            .arg(format_timestamp(record.created_at))
            .arg(ttl)
            .invoke_async(&mut conn)
            .await?;
        if created == 0 {
            return Err(PasteError::Conflict(
                "A document already exists at this address".to_string(),
            ));
        }
        Ok(())
    }

    async fn fetch(&self, address: &Address) -> Result<Option<DocumentRecord>> {
        let mut conn = self.connection.get()?;
        let fields: HashMap<String, String> = conn.hgetall(Self::redis_key(address)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        record_from_hash(address, fields).map(Some)
    }

    async fn touch(&self, record: &DocumentRecord) -> Result<()> {
        let mut conn = self.connection.get()?;
        let touched: i64 = self
            .touch_script
            .key(Self::redis_key(&record.key))
            .arg(format_timestamp(record.last_accessed_at))
            .arg(self.ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        if touched == 0 {
            return Err(PasteError::NotFound("Document was removed".to_string()));
        }
        Ok(())
    }

    async fn remove(&self, address: &Address) -> Result<bool> {
        let mut conn = self.connection.get()?;
        let deleted: i64 = conn.del(Self::redis_key(address)).await?;
        Ok(deleted > 0)
    }

    async fn remove_if_secret(&self, address: &Address, secret: &SecretHash) -> Result<bool> {
        let mut conn = self.connection.get()?;
        let deleted: i64 = self
            .delete_script
            .key(Self::redis_key(address))
            .arg(secret.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    fn native_expiry(&self) -> bool {
        true
    }

    async fn sweep_expired(&self, _cutoff: DateTime<Utc>) -> Result<usize> {
        Ok(0)
    }

    async fn close(&self) -> Result<()> {
        self.connection.close()?;
        info!("Cache storage closed");
        Ok(())
    }
}
