//! Filesystem-backed object store.
//!
//! Layout:
//! - `<root>/blobs/<key>` — blob bytes (keys with `/` become subdirectories)
//! - `<root>/meta/<key>.json` — `BlobMetadata` sidecar
//!
//! Useful for local dry runs, shared network drives, and tests.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::error::StorageError;
use crate::storage_traits::{validate_key, BlobMetadata, ObjectStore, StorageResult};

pub struct FsObjectStore {
    blobs_dir: PathBuf,
    meta_dir: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root`. Creates `blobs/` and `meta/` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let blobs_dir = root.as_ref().join("blobs");
        let meta_dir = root.as_ref().join("meta");
        fs::create_dir_all(&blobs_dir)?;
        fs::create_dir_all(&meta_dir)?;
        Ok(Self {
            blobs_dir,
            meta_dir,
        })
    }

    fn blob_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.blobs_dir.join(key))
    }

    fn meta_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.meta_dir.join(format!("{key}.json")))
    }
}

/// Write to a temp file beside `path`, then rename over it.
fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

async fn blocking<T, F>(f: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Transport(format!("blocking task failed: {e}")))?
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.blob_path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn upload(&self, key: &str, data: &[u8], metadata: &BlobMetadata) -> StorageResult<()> {
        let blob = self.blob_path(key)?;
        let meta = self.meta_path(key)?;
        let data = data.to_vec();
        let meta_json = serde_json::to_vec_pretty(metadata)
            .map_err(|e| StorageError::Malformed(e.to_string()))?;
        blocking(move || {
            write_atomic(&blob, &data)?;
            write_atomic(&meta, &meta_json)?;
            Ok(())
        })
        .await
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.blob_path(key)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    key: key.to_string(),
                }
            } else {
                StorageError::Io(e)
            }
        })
    }

    async fn metadata(&self, key: &str) -> StorageResult<Option<BlobMetadata>> {
        if !self.exists(key).await? {
            return Ok(None);
        }
        let path = self.meta_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| StorageError::Malformed(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Some(BlobMetadata::default()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let root = self.blobs_dir.clone();
        let prefix = prefix.to_string();
        blocking(move || {
            let mut keys = Vec::new();
            for entry in WalkDir::new(&root).min_depth(1) {
                let entry = entry.map_err(|e| StorageError::Io(e.into()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                // skip temp files left by an interrupted write
                let is_temp = entry.file_name().to_string_lossy().starts_with(".tmp");
                if key.starts_with(&prefix) && !is_temp {
                    keys.push(key);
                }
            }
            keys.sort();
            Ok(keys)
        })
        .await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let blob = self.blob_path(key)?;
        let meta = self.meta_path(key)?;
        for path in [blob, meta] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::Io(e)),
            }
        }
        Ok(())
    }
}
