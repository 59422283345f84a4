//! Publish cycle orchestration.
//!
//! One cycle walks
//! `Idle → Comparing → Building → Uploading → LoggingHistory → RebuildingChangelog → Done`,
//! or stops at `Done` straight from `Comparing` when nothing changed. Any
//! error moves the cycle to `Failed` and is reported with the state it
//! happened in. Remote writes are strictly ordered: artifact, manifest,
//! log entry, changelog. Nothing is retried.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use blobstate::{BlobMetadata, ObjectStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::builder::{BuildRequest, InstallerBuilder};
use crate::changelog::{rebuild_changelog, ChangelogRenderer};
use crate::codec;
use crate::comparator::{compare, PublishDecision};
use crate::config::PublishConfig;
use crate::domain::{DeliverError, Result, VersionSet};
use crate::metrics::METRICS;
use crate::obs;
use crate::publish_log::{PublishLogEntry, PublishLogStore};
use crate::remote::{guarded, remote_call};
use crate::scan::VersionProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Comparing,
    Building,
    Uploading,
    LoggingHistory,
    RebuildingChangelog,
    Done,
    Failed,
}

impl CycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleState::Idle => "idle",
            CycleState::Comparing => "comparing",
            CycleState::Building => "building",
            CycleState::Uploading => "uploading",
            CycleState::LoggingHistory => "logging_history",
            CycleState::RebuildingChangelog => "rebuilding_changelog",
            CycleState::Done => "done",
            CycleState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleState::Done | CycleState::Failed)
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a successful cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    NoChange,
    Published {
        product_version: String,
        artifact_key: String,
        log_key: String,
        changelog_key: String,
        /// Log entries removed by retention.
        pruned: usize,
    },
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: String,
    pub decision: PublishDecision,
    /// Every state entered, starting with `Idle` and ending with `Done`.
    pub transitions: Vec<CycleState>,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub fn published(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Published { .. })
    }
}

/// A cycle that ended in `Failed`.
#[derive(Debug, thiserror::Error)]
#[error("publish cycle failed while {state}: {error}")]
pub struct CycleFailure {
    pub cycle_id: String,
    /// State the cycle was in when the error occurred.
    pub state: CycleState,
    #[source]
    pub error: DeliverError,
    /// States entered, ending with `Failed`.
    pub transitions: Vec<CycleState>,
}

fn active_products() -> &'static Mutex<HashSet<String>> {
    static ACTIVE: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    ACTIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Holds a product's slot in this process for the duration of one cycle.
struct ProductGuard {
    product: String,
}

impl ProductGuard {
    fn acquire(product: &str) -> Result<Self> {
        let product = product.to_lowercase();
        let mut active = active_products()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !active.insert(product.clone()) {
            return Err(DeliverError::CycleInProgress(product));
        }
        Ok(Self { product })
    }
}

impl Drop for ProductGuard {
    fn drop(&mut self) {
        active_products()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.product);
    }
}

/// Records state transitions and enforces cancellation at step boundaries.
struct Tracker<'c> {
    cycle_id: &'c str,
    cancel: &'c CancellationToken,
    state: CycleState,
    transitions: Vec<CycleState>,
}

impl<'c> Tracker<'c> {
    fn new(cycle_id: &'c str, cancel: &'c CancellationToken) -> Self {
        Self {
            cycle_id,
            cancel,
            state: CycleState::Idle,
            transitions: vec![CycleState::Idle],
        }
    }

    fn advance(&mut self, next: CycleState) -> Result<()> {
        if !next.is_terminal() && self.cancel.is_cancelled() {
            return Err(DeliverError::Cancelled);
        }
        obs::emit_state_changed(self.cycle_id, self.state.as_str(), next.as_str());
        self.state = next;
        self.transitions.push(next);
        Ok(())
    }
}

/// Drives one publish cycle for the configured product.
pub struct PublishCoordinator<'a> {
    config: &'a PublishConfig,
    store: &'a dyn ObjectStore,
    builder: &'a dyn InstallerBuilder,
    renderer: &'a dyn ChangelogRenderer,
    probe: Arc<dyn VersionProbe>,
    cancel: CancellationToken,
}

impl<'a> PublishCoordinator<'a> {
    pub fn new(
        config: &'a PublishConfig,
        store: &'a dyn ObjectStore,
        builder: &'a dyn InstallerBuilder,
        renderer: &'a dyn ChangelogRenderer,
        probe: Arc<dyn VersionProbe>,
    ) -> Self {
        Self {
            config,
            store,
            builder,
            renderer,
            probe,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort the cycle at the next step boundary once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    async fn load_version_sets(&self) -> Result<(VersionSet, VersionSet)> {
        let local = VersionSet::scan_local_directory(
            self.config.staging_path.clone(),
            self.config.scan.clone(),
            Arc::clone(&self.probe),
        )
        .await?;
        let remote = guarded(
            "read_manifest",
            self.config.storage_timeout(),
            VersionSet::from_remote_manifest(self.store, &self.config.layout().manifest_key()),
        )
        .await?;
        Ok((local, remote))
    }

    /// Compare only. Nothing is built or written.
    pub async fn evaluate(&self) -> Result<PublishDecision> {
        let (local, remote) = self.load_version_sets().await?;
        Ok(compare(&local, &remote))
    }

    /// Run one cycle stamped with the current time.
    pub async fn run(&self) -> std::result::Result<CycleReport, CycleFailure> {
        self.run_at(Utc::now()).await
    }

    /// Run one cycle with a fixed publish timestamp (deterministic tests).
    pub async fn run_at(
        &self,
        timestamp: DateTime<Utc>,
    ) -> std::result::Result<CycleReport, CycleFailure> {
        let cycle_id = Uuid::new_v4().to_string();
        let product = self.config.layout().product().to_string();
        let span = obs::cycle_span(&cycle_id, &product);
        self.run_cycle(&cycle_id, &product, timestamp)
            .instrument(span)
            .await
    }

    async fn run_cycle(
        &self,
        cycle_id: &str,
        product: &str,
        timestamp: DateTime<Utc>,
    ) -> std::result::Result<CycleReport, CycleFailure> {
        let started = Instant::now();
        let mut tracker = Tracker::new(cycle_id, &self.cancel);
        let result = match ProductGuard::acquire(product) {
            Ok(_guard) => {
                obs::emit_cycle_started(cycle_id, product);
                self.drive(&mut tracker, timestamp).await
            }
            Err(e) => Err(e),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok((decision, outcome)) => {
                match &outcome {
                    CycleOutcome::NoChange => {
                        METRICS.inc_no_change();
                        obs::emit_no_change(cycle_id, duration_ms);
                    }
                    CycleOutcome::Published {
                        product_version,
                        artifact_key,
                        ..
                    } => {
                        METRICS.inc_published();
                        obs::emit_published(cycle_id, product_version, artifact_key, duration_ms);
                    }
                }
                Ok(CycleReport {
                    cycle_id: cycle_id.to_string(),
                    decision,
                    transitions: tracker.transitions,
                    outcome,
                })
            }
            Err(error) => {
                METRICS.inc_failed();
                obs::emit_cycle_failed(cycle_id, tracker.state.as_str(), &error);
                let state = tracker.state;
                let mut transitions = tracker.transitions;
                transitions.push(CycleState::Failed);
                Err(CycleFailure {
                    cycle_id: cycle_id.to_string(),
                    state,
                    error,
                    transitions,
                })
            }
        }
    }

    async fn drive(
        &self,
        tracker: &mut Tracker<'_>,
        timestamp: DateTime<Utc>,
    ) -> Result<(PublishDecision, CycleOutcome)> {
        let config = self.config;
        let layout = config.layout();
        let timeout = config.storage_timeout();

        tracker.advance(CycleState::Comparing)?;
        let (local, remote) = self.load_version_sets().await?;
        let decision = compare(&local, &remote);
        obs::emit_decision(
            tracker.cycle_id,
            &decision.reason.to_string(),
            decision.changed_files.len(),
            &decision.explanation,
        );
        if !decision.should_publish {
            tracker.advance(CycleState::Done)?;
            return Ok((decision, CycleOutcome::NoChange));
        }

        let product_version = local
            .get(&config.product_version_file)
            .map(|entry| entry.version().to_string())
            .ok_or_else(|| {
                DeliverError::Configuration(format!(
                    "product version file '{}' has no version in {}",
                    config.product_version_file,
                    config.staging_path.display()
                ))
            })?;
        // The manifest must never move ahead of a log entry that cannot be written.
        let log = PublishLogStore::new(self.store, &layout, timeout);
        log.vacant_key(timestamp).await?;

        tracker.advance(CycleState::Building)?;
        let artifact = self
            .builder
            .build(&BuildRequest {
                config,
                product_version: &product_version,
            })
            .await?;
        if !config.installer.success_code.accepts(artifact.exit_code) {
            return Err(DeliverError::BuildFailure(format!(
                "installer {} exited with {}, expected {:?}",
                config.installer.kind,
                artifact
                    .exit_code
                    .map_or_else(|| "no exit code".to_string(), |c| c.to_string()),
                config.installer.success_code
            )));
        }
        let body = tokio::fs::read(&artifact.path).await.map_err(|e| {
            DeliverError::BuildFailure(format!(
                "installer output {} is unreadable: {e}",
                artifact.path.display()
            ))
        })?;

        tracker.advance(CycleState::Uploading)?;
        let artifact_key = layout.installer_key(&artifact.path)?;
        let sha256 = hex::encode(Sha256::digest(&body));
        let meta = BlobMetadata::with_content_type("application/octet-stream")
            .tag("version", &product_version)
            .tag("sha256", &sha256);
        remote_call(
            "upload_artifact",
            timeout,
            self.store.upload(&artifact_key, &body, &meta),
        )
        .await?;
        METRICS.add_bytes_uploaded(body.len() as u64);

        tracker.advance(CycleState::LoggingHistory)?;
        let manifest = codec::encode_manifest(&local)?;
        let manifest_meta = BlobMetadata::with_content_type("application/xml")
            .tag("version", &product_version);
        remote_call(
            "write_manifest",
            timeout,
            self.store
                .upload(&layout.manifest_key(), &manifest, &manifest_meta),
        )
        .await?;

        let entry = PublishLogEntry {
            timestamp,
            product_version: product_version.clone(),
            published_files: decision.changed_files.clone(),
            artifact_sha256: Some(sha256),
        };
        let log_key = log.append(&entry).await?;

        tracker.advance(CycleState::RebuildingChangelog)?;
        let update =
            rebuild_changelog(self.store, &layout, self.renderer, config.retention, timeout)
                .await?;
        for (key, error) in &update.prune.failed {
            obs::emit_prune_failed(tracker.cycle_id, key, &error.to_string());
        }
        METRICS.add_prune_failures(update.prune.failed.len() as u64);

        tracker.advance(CycleState::Done)?;
        Ok((
            decision,
            CycleOutcome::Published {
                product_version,
                artifact_key,
                log_key,
                changelog_key: update.key,
                pruned: update.prune.deleted.len(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_guard_is_exclusive_and_released() {
        let first = ProductGuard::acquire("Guard-Unit-Product").unwrap();
        let err = ProductGuard::acquire("guard-unit-product").err().unwrap();
        assert!(matches!(err, DeliverError::CycleInProgress(_)));
        drop(first);
        assert!(ProductGuard::acquire("Guard-Unit-Product").is_ok());
    }

    #[test]
    fn test_tracker_stops_at_boundary_when_cancelled() {
        let token = CancellationToken::new();
        let mut tracker = Tracker::new("c1", &token);
        tracker.advance(CycleState::Comparing).unwrap();
        token.cancel();
        assert!(matches!(
            tracker.advance(CycleState::Building).unwrap_err(),
            DeliverError::Cancelled
        ));
        assert_eq!(tracker.state, CycleState::Comparing);
        tracker.advance(CycleState::Done).unwrap();
    }

    #[test]
    fn test_state_names() {
        assert_eq!(CycleState::LoggingHistory.to_string(), "logging_history");
        assert!(CycleState::Failed.is_terminal());
        assert!(!CycleState::Uploading.is_terminal());
    }
}
