//! Product-scoped remote key layout and timed object-store calls.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use blobstate::{StorageError, StorageResult};
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::domain::{DeliverError, Result};

const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const LEGACY_LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M";

/// Keys under which a product's manifest, log and changelog are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    product: String,
}

impl RemoteLayout {
    pub fn new(product_name: &str) -> Self {
        Self {
            product: product_name.trim().to_string(),
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    /// `<product>.VersionInfo.xml`
    pub fn manifest_key(&self) -> String {
        format!("{}.VersionInfo.xml", self.product)
    }

    /// `<product>/`
    pub fn log_prefix(&self) -> String {
        format!("{}/", self.product)
    }

    /// `<product>/<yyyy-MM-dd_HH-mm-ss>.<product>.xml`
    pub fn log_entry_key(&self, timestamp: DateTime<Utc>) -> String {
        format!(
            "{}/{}.{}.xml",
            self.product,
            timestamp.format(LOG_TIMESTAMP_FORMAT),
            self.product
        )
    }

    /// `<product>.ChangeLog.html`
    pub fn changelog_key(&self) -> String {
        format!("{}.ChangeLog.html", self.product)
    }

    /// Installer artifacts are stored under their own file name.
    pub fn installer_key(&self, artifact: &Path) -> Result<String> {
        artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                DeliverError::BuildFailure(format!(
                    "installer output {} has no file name",
                    artifact.display()
                ))
            })
    }

    /// Recover the publish time encoded in a log entry key.
    ///
    /// Accepts both second- and minute-resolution keys.
    pub fn timestamp_from_log_key(&self, key: &str) -> Option<DateTime<Utc>> {
        let stamp = key
            .strip_prefix(&self.log_prefix())?
            .strip_suffix(".xml")?
            .strip_suffix(&self.product)?
            .strip_suffix('.')?;
        NaiveDateTime::parse_from_str(stamp, LOG_TIMESTAMP_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(stamp, LEGACY_LOG_TIMESTAMP_FORMAT))
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Run one object-store call under `timeout`. A zero timeout waits indefinitely.
///
/// Errors and elapsed timeouts both surface as [`DeliverError::Transport`].
pub async fn remote_call<T, F>(operation: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = StorageResult<T>>,
{
    guarded(operation, timeout, async {
        fut.await.map_err(|e| DeliverError::transport(operation, e))
    })
    .await
}

/// Like [`remote_call`] for futures that already yield domain errors.
pub async fn guarded<T, F>(operation: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if timeout.is_zero() {
        return fut.await;
    }
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(DeliverError::transport(
            operation,
            StorageError::Transport(format!("timed out after {}s", timeout.as_secs_f64())),
        )),
    }
}
