//! Domain-level error taxonomy for stagepush.

use std::path::PathBuf;

use blobstate::StorageError;

/// stagepush domain errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliverError {
    /// Missing or invalid settings. Fatal, no cycle starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Version metadata on a matched file could not be read. The file is skipped.
    #[error("cannot read version from {}: {reason}", path.display())]
    LocalScan { path: PathBuf, reason: String },

    /// Installer builder reported an unexpected status. Aborts before any upload.
    #[error("installer build failed: {0}")]
    BuildFailure(String),

    /// An object-store call failed or timed out.
    #[error("{operation} failed: {source}")]
    Transport {
        operation: String,
        #[source]
        source: StorageError,
    },

    /// Best-effort log cleanup failed. Logged only.
    #[error("log pruning failed: {0}")]
    Prune(String),

    /// Manifest or log document is inconsistent or cannot be encoded/decoded.
    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("a publish cycle for {0} is already running in this process")]
    CycleInProgress(String),

    #[error("publish cycle cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeliverError {
    pub fn transport(operation: &str, source: StorageError) -> Self {
        DeliverError::Transport {
            operation: operation.to_string(),
            source,
        }
    }
}

/// Result type for stagepush domain operations.
pub type Result<T> = std::result::Result<T, DeliverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_names_operation() {
        let err = DeliverError::transport(
            "write_manifest",
            StorageError::Http {
                status: 503,
                key: "P.VersionInfo.xml".to_string(),
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("write_manifest"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn test_local_scan_error_display() {
        let err = DeliverError::LocalScan {
            path: PathBuf::from("/stage/app.exe"),
            reason: "truncated resource".to_string(),
        };
        assert!(err.to_string().contains("/stage/app.exe"));
        assert!(err.to_string().contains("truncated resource"));
    }

    #[test]
    fn test_configuration_error() {
        let err = DeliverError::Configuration("product_name is empty".to_string());
        assert!(err.to_string().contains("configuration error"));
    }
}
