//! Document-store backend on ArangoDB's HTTP API.
//!
//! Documents live in the `pasteDocuments` collection keyed by address.
//! Expiry is native: a TTL index on `lastAccessedAt` (unix seconds) removes
//! documents once the window elapses, and `prepare` rebuilds the index
//! whenever the configured window differs from the one provisioned.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use super::traits::StorageBackend;
use super::types::{Address, DocumentRecord};
use crate::config::{StorageConfig, StorageKind};
use crate::error::{PasteError, Result};
use crate::expiry::ExpiryPolicy;
use crate::secret::SecretHash;

const COLLECTION: &str = "pasteDocuments";
const TTL_INDEX: &str = "ttl";
const SYSTEM_DATABASE: &str = "_system";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ArangoBackend {
    client: Client,
    base_url: Url,
    database: String,
    user: String,
    password: Option<SecretString>,
    expire_after_secs: u64,
}

impl ArangoBackend {
    pub fn from_config(config: &StorageConfig, policy: ExpiryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PasteError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let mut base_url = Url::parse("http://localhost/")
            .map_err(|e| PasteError::Config(format!("Invalid database URL: {}", e)))?;
        base_url
            .set_host(Some(&config.host))
            .map_err(|e| PasteError::Config(format!("Invalid database host '{}': {}", config.host, e)))?;
        base_url
            .set_port(Some(config.port))
            .map_err(|_| PasteError::Config(format!("Invalid database port {}", config.port)))?;
        Ok(Self {
            client,
            base_url,
            database: config.database.clone(),
            user: config.user.clone(),
            password: config
                .password
                .as_ref()
                .map(|p| SecretString::from(p.expose_secret().to_string())),
            expire_after_secs: policy.window_secs(),
        })
    }

    /// `/_db/{database}/{segments...}` under the server URL. Segments are
    /// percent-encoded individually.
    fn url(&self, database: &str, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PasteError::Config(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(["_db", database])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, database: &str, segments: &[&str]) -> Result<RequestBuilder> {
        Ok(self
            .client
            .request(method, self.url(database, segments)?)
            .basic_auth(&self.user, self.password.as_ref().map(|p| p.expose_secret())))
    }

    fn db_request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        self.request(method, &self.database, segments)
    }

    fn document_path(address: &Address) -> [&str; 4] {
        ["_api", "document", COLLECTION, address.as_str()]
    }

    async fn failure(context: &str, response: Response) -> PasteError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        PasteError::Storage(format!("{} failed: {} {}", context, status, body))
    }

    async fn ensure_database(&self) -> Result<()> {
        let response = self
            .db_request(Method::GET, &["_api", "database", "current"])?
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => return Ok(()),
            StatusCode::NOT_FOUND => {}
            _ => return Err(Self::failure("Database lookup", response).await),
        }

        let response = self
            .request(Method::POST, SYSTEM_DATABASE, &["_api", "database"])?
            .json(&json!({ "name": self.database }))
            .send()
            .await?;
        match response.status() {
            status if status.is_success() || status == StatusCode::CONFLICT => {
                info!(database = %self.database, "Created database");
                Ok(())
            }
            _ => Err(Self::failure("Database creation", response).await),
        }
    }

    async fn ensure_collection(&self) -> Result<()> {
        let response = self
            .db_request(Method::GET, &["_api", "collection", COLLECTION])?
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => return Ok(()),
            StatusCode::NOT_FOUND => {}
            _ => return Err(Self::failure("Collection lookup", response).await),
        }

        let response = self
            .db_request(Method::POST, &["_api", "collection"])?
            .json(&json!({ "name": COLLECTION }))
            .send()
            .await?;
        match response.status() {
            status if status.is_success() || status == StatusCode::CONFLICT => {
                info!(collection = COLLECTION, "Created collection");
                Ok(())
            }
            _ => Err(Self::failure("Collection creation", response).await),
        }
    }

    /// Provision the TTL index, rebuilding it when the window changed.
    async fn ensure_ttl_index(&self) -> Result<()> {
        let response = self
            .db_request(Method::GET, &["_api", "index"])?
            .query(&[("collection", COLLECTION)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::failure("Index listing", response).await);
        }
        let listing: IndexList = response.json().await?;

        if let Some(index) = listing.indexes.iter().find(|i| i.name == TTL_INDEX) {
            if index.matches_window(self.expire_after_secs) {
                debug!(expire_after = self.expire_after_secs, "TTL index up to date");
                return Ok(());
            }
            let response = self
                .db_request(Method::DELETE, &index_path(&index.id))?
                .send()
                .await?;
            if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
                return Err(Self::failure("TTL index removal", response).await);
            }
            info!(
                previous = ?index.expire_after,
                expire_after = self.expire_after_secs,
                "Expiry window changed; rebuilding TTL index"
            );
        }

        let response = self
            .db_request(Method::POST, &["_api", "index"])?
            .query(&[("collection", COLLECTION)])
            .json(&json!({
                "type": "ttl",
                "name": TTL_INDEX,
                "fields": ["lastAccessedAt"],
                "expireAfter": self.expire_after_secs,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::failure("TTL index creation", response).await);
        }
        info!(expire_after = self.expire_after_secs, "TTL index provisioned");
        Ok(())
    }

    async fn fetch_document(&self, address: &Address) -> Result<Option<ArangoDocument>> {
        let response = self
            .db_request(Method::GET, &Self::document_path(address))?
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(Self::failure("Document read", response).await),
        }
    }
}

/// Index ids come back as `{collection}/{id}`; the handle keeps both parts.
fn index_path(id: &str) -> Vec<&str> {
    let mut segments = vec!["_api", "index"];
    segments.extend(id.split('/'));
    segments
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexInfo {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    expire_after: Option<f64>,
}

impl IndexInfo {
    fn matches_window(&self, secs: u64) -> bool {
        self.expire_after
            .map(|current| (current - secs as f64).abs() < 0.5)
            .unwrap_or(false)
    }
}

/// Wire form of a record in the collection.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArangoDocument {
    #[serde(rename = "_key")]
    key: String,
    #[serde(rename = "_rev", default, skip_serializing)]
    rev: Option<String>,
    #[serde(alias = "deleteSecret")]
    delete_secret_hash: String,
    text: String,
    #[serde(default)]
    is_static: bool,
    #[serde(default)]
    is_encrypted: bool,
    /// Unix seconds; the TTL index only understands numbers or ISO strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_accessed_at: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<f64>,
}

fn to_unix_seconds(value: DateTime<Utc>) -> f64 {
    value.timestamp_millis() as f64 / 1000.0
}

fn from_unix_seconds(value: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis((value * 1000.0).round() as i64)
}

impl From<&DocumentRecord> for ArangoDocument {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            key: record.key.as_str().to_string(),
            rev: None,
            delete_secret_hash: record.delete_secret_hash.as_str().to_string(),
            text: record.text.clone(),
            is_static: record.is_static,
            is_encrypted: record.is_encrypted,
            last_accessed_at: record.last_accessed_at.map(to_unix_seconds),
            created_at: record.created_at.map(to_unix_seconds),
        }
    }
}

impl From<ArangoDocument> for DocumentRecord {
    fn from(doc: ArangoDocument) -> Self {
        Self {
            key: Address::from_stored(doc.key),
            delete_secret_hash: SecretHash::from_stored(doc.delete_secret_hash),
            text: doc.text,
            is_static: doc.is_static,
            is_encrypted: doc.is_encrypted,
            last_accessed_at: doc.last_accessed_at.and_then(from_unix_seconds),
            created_at: doc.created_at.and_then(from_unix_seconds),
        }
    }
}

#[async_trait]
impl StorageBackend for ArangoBackend {
    fn kind(&self) -> StorageKind {
        StorageKind::Document
    }

    async fn prepare(&self) -> Result<()> {
        self.ensure_database().await?;
        self.ensure_collection().await?;
        self.ensure_ttl_index().await?;
        info!(url = %self.base_url, database = %self.database, "Document storage prepared");
        Ok(())
    }

    async fn insert(&self, record: &DocumentRecord) -> Result<()> {
        let response = self
            .db_request(Method::POST, &["_api", "document", COLLECTION])?
            .json(&ArangoDocument::from(record))
            .send()
            .await?;
        match response.status() {
            StatusCode::CONFLICT => Err(PasteError::Conflict(
                "A document already exists at this address".to_string(),
            )),
            status if status.is_success() => Ok(()),
            _ => Err(Self::failure("Document insert", response).await),
        }
    }

    async fn fetch(&self, address: &Address) -> Result<Option<DocumentRecord>> {
        Ok(self.fetch_document(address).await?.map(DocumentRecord::from))
    }

    async fn touch(&self, record: &DocumentRecord) -> Result<()> {
        let response = self
            .db_request(Method::PATCH, &Self::document_path(&record.key))?
            .json(&json!({
                "lastAccessedAt": record.last_accessed_at.map(to_unix_seconds),
            }))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(PasteError::NotFound("Document was removed".to_string())),
            status if status.is_success() => Ok(()),
            _ => Err(Self::failure("Document touch", response).await),
        }
    }

    async fn remove(&self, address: &Address) -> Result<bool> {
        let response = self
            .db_request(Method::DELETE, &Self::document_path(address))?
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::failure("Document delete", response).await),
        }
    }

    async fn remove_if_secret(&self, address: &Address, secret: &SecretHash) -> Result<bool> {
        let Some(doc) = self.fetch_document(address).await? else {
            return Ok(false);
        };
        if !SecretHash::from_stored(doc.delete_secret_hash.as_str()).matches(secret) {
            return Ok(false);
        }

        let mut request = self.db_request(Method::DELETE, &Self::document_path(address))?;
        if let Some(rev) = &doc.rev {
            request = request.header("If-Match", rev.as_str());
        }
        let response = request.send().await?;
        match response.status() {
            // Gone or replaced since the secret was checked.
            StatusCode::NOT_FOUND | StatusCode::PRECONDITION_FAILED => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::failure("Document delete", response).await),
        }
    }

    fn native_expiry(&self) -> bool {
        true
    }

    async fn sweep_expired(&self, _cutoff: DateTime<Utc>) -> Result<usize> {
        Ok(0)
    }

    async fn close(&self) -> Result<()> {
        debug!("Document storage closed");
        Ok(())
    }
}
