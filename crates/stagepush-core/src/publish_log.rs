//! Append-only publish history stored as one blob per publish event.

use std::time::Duration;

use blobstate::{BlobMetadata, ObjectStore};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::codec;
use crate::domain::{DeliverError, Result, VersionSet};
use crate::remote::{remote_call, RemoteLayout};

/// Retention window used when none is configured.
pub const DEFAULT_RETENTION: usize = 50;

/// One successful publish. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishLogEntry {
    pub timestamp: DateTime<Utc>,
    pub product_version: String,
    /// Changed files only, not the full manifest.
    pub published_files: VersionSet,
    pub artifact_sha256: Option<String>,
}

/// Publish history, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishLog {
    entries: Vec<PublishLogEntry>,
}

impl PublishLog {
    pub fn new(mut entries: Vec<PublishLogEntry>) -> Self {
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Self { entries }
    }

    pub fn entries(&self) -> &[PublishLogEntry] {
        &self.entries
    }

    pub fn latest(&self) -> Option<&PublishLogEntry> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of a best-effort retention pass.
#[derive(Debug, Default)]
pub struct PruneReport {
    pub deleted: Vec<String>,
    /// Key (or the log prefix when listing failed) with a [`DeliverError::Prune`].
    pub failed: Vec<(String, DeliverError)>,
}

impl PruneReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Reads and writes a product's log entries through an [`ObjectStore`].
pub struct PublishLogStore<'a> {
    store: &'a dyn ObjectStore,
    layout: &'a RemoteLayout,
    timeout: Duration,
}

impl<'a> PublishLogStore<'a> {
    pub fn new(store: &'a dyn ObjectStore, layout: &'a RemoteLayout, timeout: Duration) -> Self {
        Self {
            store,
            layout,
            timeout,
        }
    }

    /// Key for an entry stamped `timestamp`, or a `Manifest` error if one is
    /// already stored there.
    pub async fn vacant_key(&self, timestamp: DateTime<Utc>) -> Result<String> {
        let key = self.layout.log_entry_key(timestamp);
        if remote_call("check_log", self.timeout, self.store.exists(&key)).await? {
            return Err(DeliverError::Manifest(format!(
                "log entry {key} already exists"
            )));
        }
        Ok(key)
    }

    /// Write `entry` under its timestamp key and return the key.
    ///
    /// Never overwrites an existing entry.
    pub async fn append(&self, entry: &PublishLogEntry) -> Result<String> {
        let key = self.vacant_key(entry.timestamp).await?;

        let body = codec::encode_log_entry(entry)?;
        let meta = BlobMetadata::with_content_type("application/xml")
            .tag("version", &entry.product_version);
        remote_call("append_log", self.timeout, self.store.upload(&key, &body, &meta)).await?;
        debug!(key = %key, "log entry appended");
        Ok(key)
    }

    /// Log keys ordered newest first.
    async fn sorted_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<(DateTime<Utc>, String)> = remote_call(
            "list_log",
            self.timeout,
            self.store.list(&self.layout.log_prefix()),
        )
        .await?
        .into_iter()
        .filter_map(|key| {
            self.layout
                .timestamp_from_log_key(&key)
                .map(|ts| (ts, key))
        })
        .collect();
        keys.sort_by(|a, b| b.cmp(a));
        Ok(keys.into_iter().map(|(_, key)| key).collect())
    }

    /// Fetch up to `limit` of the newest entries. Undecodable entries are skipped.
    pub async fn load_recent(&self, limit: usize) -> Result<PublishLog> {
        let mut entries = Vec::new();
        for key in self.sorted_keys().await?.into_iter().take(limit) {
            let bytes = remote_call("read_log", self.timeout, self.store.download(&key)).await?;
            match codec::decode_log_entry(&bytes) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(key = %key, error = %e, "skipping unreadable log entry"),
            }
        }
        Ok(PublishLog::new(entries))
    }

    /// Delete everything older than the newest `keep` entries.
    ///
    /// Failures are collected, never returned as errors.
    pub async fn prune(&self, keep: usize) -> PruneReport {
        let mut report = PruneReport::default();
        let keys = match self.sorted_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                report
                    .failed
                    .push((self.layout.log_prefix(), DeliverError::Prune(e.to_string())));
                return report;
            }
        };

        for key in keys.into_iter().skip(keep) {
            match remote_call("prune_log", self.timeout, self.store.delete(&key)).await {
                Ok(()) => report.deleted.push(key),
                Err(e) => report.failed.push((key, DeliverError::Prune(e.to_string()))),
            }
        }
        report
    }
}
