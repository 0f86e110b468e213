//! # Paste Core
//!
//! Core library for a text-paste hosting service: clients submit text,
//! receive a short lookup key plus a one-time delete secret, and later
//! retrieve or delete the paste by key.
//!
//! This crate provides the document persistence layer independent of any
//! transport. It behaves identically across four storage engines.
//!
//! ## Architecture
//!
//! - **keys** / **secret**: lookup keys, delete secrets and their digests
//! - **crypto**: at-rest encryption of document text
//! - **storage**: the storage contract and its backend adapters
//! - **expiry**: sliding-TTL policy shared by every adapter
//! - **reaper**: background sweep for adapters without native expiry
//! - **service**: the create/fetch/delete flow a front end drives

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod expiry;
pub mod fs;
pub mod keys;
pub mod reaper;
pub mod secret;
pub mod service;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PasteConfig, StorageConfig, StorageKind};
pub use crypto::{EncryptionKey, TextCodec};
pub use error::{PasteError, Result};
pub use expiry::ExpiryPolicy;
pub use keys::KeyGenerator;
pub use secret::{hash_secret, DeleteSecret, SecretHash};
pub use service::{CreatedPaste, PasteService};
pub use storage::{DocumentStorage, StorageBackend};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
