//! In-memory fake for the storage trait (testing only)
//!
//! `MemoryObjectStore` satisfies the `ObjectStore` contract without any
//! external dependencies, counts every call, and can be told to fail a
//! given operation so callers can exercise their error paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

/// Store operation, used for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Exists,
    Upload,
    Download,
    Metadata,
    List,
    Delete,
}

impl StoreOp {
    fn as_str(&self) -> &'static str {
        match self {
            StoreOp::Exists => "exists",
            StoreOp::Upload => "upload",
            StoreOp::Download => "download",
            StoreOp::Metadata => "metadata",
            StoreOp::List => "list",
            StoreOp::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Vec<u8>,
    metadata: BlobMetadata,
}

/// Per-operation call counters.
#[derive(Debug, Default)]
pub struct OpCounters {
    pub exists: AtomicUsize,
    pub uploads: AtomicUsize,
    pub downloads: AtomicUsize,
    pub metadata: AtomicUsize,
    pub lists: AtomicUsize,
    pub deletes: AtomicUsize,
}

/// In-memory object store backed by a `BTreeMap<key, blob>`.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    blobs: Mutex<BTreeMap<String, StoredBlob>>,
    failures: Mutex<HashSet<(StoreOp, String)>>,
    counters: OpCounters,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `op` on a key starting with `key_prefix` fail.
    ///
    /// An empty prefix matches every key.
    pub fn fail_on(&self, op: StoreOp, key_prefix: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert((op, key_prefix.to_string()));
    }

    /// Remove all planted failures.
    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Call counters since construction.
    pub fn counters(&self) -> &OpCounters {
        &self.counters
    }

    /// Number of `upload` calls, successful or not.
    pub fn upload_count(&self) -> usize {
        self.counters.uploads.load(Ordering::SeqCst)
    }

    /// All keys currently stored.
    pub fn keys(&self) -> Vec<String> {
        self.blobs.lock().unwrap().keys().cloned().collect()
    }

    fn check(&self, op: StoreOp, key: &str) -> StorageResult<()> {
        let failures = self.failures.lock().unwrap();
        if failures
            .iter()
            .any(|(o, prefix)| *o == op && key.starts_with(prefix.as_str()))
        {
            return Err(StorageError::InjectedFailure {
                op: op.as_str().to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.counters.exists.fetch_add(1, Ordering::SeqCst);
        self.check(StoreOp::Exists, key)?;
        Ok(self.blobs.lock().unwrap().contains_key(key))
    }

    async fn upload(&self, key: &str, data: &[u8], metadata: &BlobMetadata) -> StorageResult<()> {
        self.counters.uploads.fetch_add(1, Ordering::SeqCst);
        validate_key(key)?;
        self.check(StoreOp::Upload, key)?;
        self.blobs.lock().unwrap().insert(
            key.to_string(),
            StoredBlob {
                data: data.to_vec(),
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.counters.downloads.fetch_add(1, Ordering::SeqCst);
        self.check(StoreOp::Download, key)?;
        self.blobs
            .lock()
            .unwrap()
            .get(key)
            .map(|b| b.data.clone())
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn metadata(&self, key: &str) -> StorageResult<Option<BlobMetadata>> {
        self.counters.metadata.fetch_add(1, Ordering::SeqCst);
        self.check(StoreOp::Metadata, key)?;
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .get(key)
            .map(|b| b.metadata.clone()))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.counters.lists.fetch_add(1, Ordering::SeqCst);
        self.check(StoreOp::List, prefix)?;
        let blobs = self.blobs.lock().unwrap();
        Ok(blobs
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.counters.deletes.fetch_add(1, Ordering::SeqCst);
        self.check(StoreOp::Delete, key)?;
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }
}
