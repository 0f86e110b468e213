//! At-rest encryption of document text.
//!
//! - **AES-256-GCM**: authenticated encryption with a fresh random nonce per
//!   document, serialized as `<nonce-hex>:<tag-hex>:<ciphertext-hex>`
//! - **Argon2id**: optional derivation of the key from an operator passphrase
//!
//! ## Key lifecycle
//!
//! One key per process, supplied by configuration or generated at startup.
//! A generated key lives only in memory: documents encrypted with it cannot be
//! read after a restart. Whether a document was encrypted is recorded on the
//! document itself, so toggling encryption never breaks older documents.

pub mod codec;
pub mod key;

pub use codec::{EncodedText, TextCodec};
pub use key::{EncryptionKey, KeySource};
