//! Relational storage backend on SQLite.
//!
//! A single `paste_documents` table keyed by address. Timestamps are stored
//! as fixed-width RFC 3339 UTC strings so they compare correctly as text.
//! Each operation runs on its own pooled connection, so requests for
//! different documents do not queue behind one another.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use super::traits::StorageBackend;
use super::types::{Address, DocumentRecord};
use crate::config::StorageKind;
use crate::error::{PasteError, Result};
use crate::secret::SecretHash;

const IN_MEMORY: &str = ":memory:";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS paste_documents (
    key_id TEXT PRIMARY KEY NOT NULL,
    delete_secret TEXT NOT NULL,
    text TEXT NOT NULL,
    is_static INTEGER NOT NULL DEFAULT 0,
    is_encrypted INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    created_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_last_accessed ON paste_documents(last_accessed_at);
";

/// Most connections a file database keeps open at once.
const MAX_CONNECTIONS: usize = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-operation connections. A query runs on its own connection with no
/// shared lock held; the idle list is locked only to push or pop.
///
/// An in-memory database lives and dies with its single connection, so it
/// gets one permit and never opens a second.
struct ConnectionPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    open: AtomicBool,
}

impl ConnectionPool {
    fn new(path: PathBuf) -> Self {
        let capacity = if path.as_os_str() == IN_MEMORY {
            1
        } else {
            MAX_CONNECTIONS
        };
        Self {
            path,
            idle: Mutex::new(Vec::new()),
            permits: Arc::new(Semaphore::new(capacity)),
            open: AtomicBool::new(false),
        }
    }

    fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY
    }

    fn idle(&self) -> Result<MutexGuard<'_, Vec<Connection>>> {
        self.idle
            .lock()
            .map_err(|_| PasteError::Storage("SQLite connection pool poisoned".to_string()))
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        if !self.is_in_memory() {
            // Readers keep going while a writer holds the database.
            let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            debug!(journal_mode = %mode, "Opened SQLite connection");
        }
        Ok(conn)
    }

    fn not_open() -> PasteError {
        PasteError::Storage("SQLite connection is not open".to_string())
    }

    /// Take an idle connection, opening one if none is free.
    fn checkout(&self) -> Result<Connection> {
        if !self.open.load(Ordering::Acquire) {
            return Err(Self::not_open());
        }
        if let Some(conn) = self.idle()?.pop() {
            return Ok(conn);
        }
        if self.is_in_memory() {
            return Err(Self::not_open());
        }
        self.connect()
    }

    /// Return a connection; after `close` it is dropped instead.
    fn checkin(&self, conn: Connection) {
        if !self.open.load(Ordering::Acquire) {
            return;
        }
        if let Ok(mut idle) = self.idle() {
            idle.push(conn);
        }
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Self::not_open())
    }
}

/// SQLite-backed relational storage.
pub struct SqliteBackend {
    path: PathBuf,
    pool: Arc<ConnectionPool>,
}

impl SqliteBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            pool: Arc::new(ConnectionPool::new(path.clone())),
            path,
        }
    }

    /// A private in-memory database, gone when the backend is dropped.
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` on a pooled connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.pool.permit().await?;
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let conn = pool.checkout()?;
            let result = f(&conn);
            pool.checkin(conn);
            result
        })
        .await?
    }
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| PasteError::Storage(format!("Invalid timestamp: {}", e)))
        })
        .transpose()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Raw column values of one `paste_documents` row.
struct DocumentRow {
    key_id: String,
    delete_secret: String,
    text: String,
    is_static: bool,
    is_encrypted: bool,
    last_accessed_at: Option<String>,
    created_at: Option<String>,
}

impl DocumentRow {
    const COLUMNS: &'static str =
        "key_id, delete_secret, text, is_static, is_encrypted, last_accessed_at, created_at";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key_id: row.get(0)?,
            delete_secret: row.get(1)?,
            text: row.get(2)?,
            is_static: row.get(3)?,
            is_encrypted: row.get(4)?,
            last_accessed_at: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<DocumentRecord> {
        Ok(DocumentRecord {
            key: Address::from_stored(self.key_id),
            delete_secret_hash: SecretHash::from_stored(self.delete_secret),
            text: self.text,
            is_static: self.is_static,
            is_encrypted: self.is_encrypted,
            last_accessed_at: parse_timestamp(self.last_accessed_at)?,
            created_at: parse_timestamp(self.created_at)?,
        })
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    fn kind(&self) -> StorageKind {
        StorageKind::Relational
    }

    async fn prepare(&self) -> Result<()> {
        let permit = self.pool.permit().await?;
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let _permit = permit;
            if !pool.is_in_memory() {
                if let Some(parent) = pool.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let popped = pool.idle()?.pop();
            let conn = match popped {
                Some(conn) => conn,
                None => pool.connect()?,
            };
            let created = conn.execute_batch(SCHEMA);
            pool.open.store(true, Ordering::Release);
            pool.checkin(conn);
            created?;
            Ok(())
        })
        .await??;
        info!(path = %self.path.display(), "Relational storage prepared");
        Ok(())
    }

    async fn insert(&self, record: &DocumentRecord) -> Result<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO paste_documents \
                 (key_id, delete_secret, text, is_static, is_encrypted, last_accessed_at, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.key.as_str(),
                    record.delete_secret_hash.as_str(),
                    record.text,
                    record.is_static,
                    record.is_encrypted,
                    record.last_accessed_at.map(format_timestamp),
                    record.created_at.map(format_timestamp),
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(e) if is_constraint_violation(&e) => Err(PasteError::Conflict(
                    "A document already exists at this address".to_string(),
                )),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn fetch(&self, address: &Address) -> Result<Option<DocumentRecord>> {
        let address = address.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM paste_documents WHERE key_id = ?1",
                DocumentRow::COLUMNS
            );
            let row = conn
                .query_row(&sql, params![address.as_str()], DocumentRow::from_row)
                .optional()?;
            row.map(DocumentRow::into_record).transpose()
        })
        .await
    }

    async fn touch(&self, record: &DocumentRecord) -> Result<()> {
        let address = record.key.clone();
        let last_accessed_at = record.last_accessed_at.map(format_timestamp);
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE paste_documents SET last_accessed_at = ?2 WHERE key_id = ?1",
                params![address.as_str(), last_accessed_at],
            )?;
            if updated == 0 {
                return Err(PasteError::NotFound("Document was removed".to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn remove(&self, address: &Address) -> Result<bool> {
        let address = address.clone();
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM paste_documents WHERE key_id = ?1",
                params![address.as_str()],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn remove_if_secret(&self, address: &Address, secret: &SecretHash) -> Result<bool> {
        let address = address.clone();
        let secret = secret.clone();
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM paste_documents WHERE key_id = ?1 AND delete_secret = ?2",
                params![address.as_str(), secret.as_str()],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cutoff = format_timestamp(cutoff);
        let removed = self
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM paste_documents \
                     WHERE is_static = 0 AND last_accessed_at IS NOT NULL AND last_accessed_at < ?1",
                    params![cutoff],
                )?)
            })
            .await?;
        debug!(removed, "Relational sweep finished");
        Ok(removed)
    }

    async fn close(&self) -> Result<()> {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || -> Result<()> {
            pool.open.store(false, Ordering::Release);
            let drained = std::mem::take(&mut *pool.idle()?);
            for conn in drained {
                conn.close().map_err(|(_, e)| PasteError::from(e))?;
            }
            Ok(())
        })
        .await?
    }
}
