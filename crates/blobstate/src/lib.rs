//! Blobstate: object-store persistence for stagepush
//!
//! This crate owns every byte that leaves the machine during a publish
//! cycle: version manifests, publish log entries, rendered changelogs and
//! installer artifacts.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: a narrow, retry-free blob interface with interchangeable backends.
//!
//! ## Key Components
//!
//! - `ObjectStore`: exists / upload / download / list / delete contract
//! - `AzureBlobStore`: Azure Blob REST backend (SAS token auth)
//! - `FsObjectStore`: directory-backed store for local runs and shares
//! - `MemoryObjectStore`: in-memory fake with call counters and failure injection

pub mod azure;
mod error;
pub mod fakes;
pub mod fs_store;
pub mod storage_traits;

pub use azure::{AzureBlobConfig, AzureBlobStore};
pub use error::StorageError;
pub use fs_store::FsObjectStore;
pub use storage_traits::{validate_key, BlobMetadata, ObjectStore, StorageResult};
