//! Filesystem storage backend.
//!
//! One JSON document per file under a root directory. The file name is the
//! bare address with no extension, so stores written by earlier deployments
//! load as they are. Filesystem calls run on tokio's blocking pool.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::traits::StorageBackend;
use super::types::{Address, DocumentRecord};
use crate::config::StorageKind;
use crate::error::{PasteError, Result};
use crate::fs::{write_new, write_replace};

pub struct FileBackend {
    root: PathBuf,
    /// Held while a file is replaced or unlinked. A touch checks for the file
    /// and renames over it under this lock, so a removal in this process
    /// cannot land in between. Other processes sharing the directory are not
    /// covered.
    write_lock: Arc<Mutex<()>>,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, address: &Address) -> PathBuf {
        self.root.join(address.as_str())
    }

    async fn blocking<T, F>(f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f).await?
    }
}

fn read_record(path: &Path) -> Result<Option<DocumentRecord>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Documents are named by address; temp files and anything else are skipped.
fn is_document_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(Address::is_well_formed)
        .unwrap_or(false)
}

fn hold(lock: &Mutex<()>) -> Result<MutexGuard<'_, ()>> {
    lock.lock()
        .map_err(|_| PasteError::Storage("File storage lock poisoned".to_string()))
}

#[async_trait]
impl StorageBackend for FileBackend {
    fn kind(&self) -> StorageKind {
        StorageKind::File
    }

    async fn prepare(&self) -> Result<()> {
        let root = self.root.clone();
        Self::blocking(move || {
            fs::create_dir_all(&root).map_err(|e| {
                PasteError::Storage(format!(
                    "Cannot create storage directory {}: {}",
                    root.display(),
                    e
                ))
            })
        })
        .await?;
        info!(path = %self.root.display(), "File storage prepared");
        Ok(())
    }

    async fn insert(&self, record: &DocumentRecord) -> Result<()> {
        let path = self.path_for(&record.key);
        let contents = serde_json::to_vec(record)?;
        Self::blocking(move || match write_new(&path, &contents) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(PasteError::Conflict(
                "A document already exists at this address".to_string(),
            )),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn fetch(&self, address: &Address) -> Result<Option<DocumentRecord>> {
        let path = self.path_for(address);
        let address = address.clone();
        Self::blocking(move || {
            Ok(read_record(&path)?.map(|mut record| {
                // Older files did not carry their own address.
                if record.key.as_str().is_empty() {
                    record.key = address;
                }
                record
            }))
        })
        .await
    }

    async fn touch(&self, record: &DocumentRecord) -> Result<()> {
        let path = self.path_for(&record.key);
        let contents = serde_json::to_vec(record)?;
        let lock = self.write_lock.clone();
        Self::blocking(move || {
            let _guard = hold(&lock)?;
            // Never resurrect a document removed since it was read.
            if !path.exists() {
                return Err(PasteError::NotFound("Document was removed".to_string()));
            }
            write_replace(&path, &contents)?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, address: &Address) -> Result<bool> {
        let path = self.path_for(address);
        let lock = self.write_lock.clone();
        Self::blocking(move || {
            let _guard = hold(&lock)?;
            match fs::remove_file(&path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let root = self.root.clone();
        let lock = self.write_lock.clone();
        Self::blocking(move || {
            let mut removed = 0;
            for entry in fs::read_dir(&root)? {
                let path = entry?.path();
                if !is_document_file(&path) {
                    continue;
                }
                let record = match read_record(&path) {
                    Ok(Some(record)) => record,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable document");
                        continue;
                    }
                };
                let stale = !record.is_static
                    && record
                        .last_accessed_at
                        .map(|at| at < cutoff)
                        .unwrap_or(false);
                if stale {
                    let _guard = hold(&lock)?;
                    match fs::remove_file(&path) {
                        Ok(()) => removed += 1,
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            debug!(removed, "File sweep finished");
            Ok(removed)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
