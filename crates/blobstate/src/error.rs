//! Error types for blobstate

use thiserror::Error;

/// Errors that can occur talking to an object store
#[derive(Error, Debug)]
pub enum StorageError {
    /// Blob does not exist
    #[error("Blob not found: {key}")]
    NotFound { key: String },

    /// Key is empty, absolute, or escapes the store root
    #[error("Invalid blob key: {key}")]
    InvalidKey { key: String },

    /// Remote service answered with an unexpected status
    #[error("Unexpected HTTP status {status} for {key}")]
    Http { status: u16, key: String },

    /// Request never produced a response (DNS, TLS, connection reset, ...)
    #[error("Transport failed: {0}")]
    Transport(String),

    /// Local filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or unusable credentials
    #[error("Credentials rejected: {0}")]
    Credentials(String),

    /// Response body could not be decoded
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Failure planted by `MemoryObjectStore` for tests
    #[error("Injected {op} failure for {key}")]
    InjectedFailure { op: String, key: String },
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Transport(err.to_string())
    }
}

impl StorageError {
    /// Whether this error means the blob is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
