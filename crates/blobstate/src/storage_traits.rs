//! Storage trait definitions for stagepush
//!
//! `ObjectStore` is the only seam between publish logic and the remote blob
//! service. It is deliberately narrow (exists / upload / download / list /
//! delete) and performs no retries; retry policy, if any, belongs to the
//! backend.
//!
//! All operations are async and backend-agnostic. An in-memory fake is
//! provided for testing via the `fakes` module.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Properties attached to a blob on upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    /// MIME type served back to readers (e.g. `text/html`)
    pub content_type: Option<String>,
    /// Free-form key/value tags (e.g. `version = 1.2.0.0`)
    pub tags: BTreeMap<String, String>,
}

impl BlobMetadata {
    /// Metadata with only a content type.
    pub fn with_content_type(content_type: &str) -> Self {
        Self {
            content_type: Some(content_type.to_string()),
            tags: BTreeMap::new(),
        }
    }

    /// Add a tag.
    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }
}

/// Remote blob store.
///
/// Guarantees:
/// - `upload(key, ..)` replaces any existing blob at `key` (last writer wins).
/// - `download(key)` returns the exact bytes last uploaded, or
///   `StorageError::NotFound`.
/// - `list(prefix)` returns every key starting with `prefix`, sorted
///   ascending.
/// - `delete(key)` is a no-op when the key is absent.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check whether a blob exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Store bytes under `key`.
    async fn upload(&self, key: &str, data: &[u8], metadata: &BlobMetadata) -> StorageResult<()>;

    /// Store the contents of a local file under `key`.
    async fn upload_file(
        &self,
        key: &str,
        path: &Path,
        metadata: &BlobMetadata,
    ) -> StorageResult<()> {
        let data = tokio::fs::read(path).await?;
        self.upload(key, &data, metadata).await
    }

    /// Retrieve the bytes stored under `key`.
    async fn download(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Retrieve blob metadata, `None` when absent.
    async fn metadata(&self, key: &str) -> StorageResult<Option<BlobMetadata>>;

    /// List keys starting with `prefix`, sorted ascending.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Delete a blob. No-op if absent.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Reject keys that are empty, absolute, or contain `..` / backslash segments.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}
