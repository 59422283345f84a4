//! stagepush core library
//!
//! Version-delta detection and publish-record reconciliation: decides when a
//! staged build is newer than what was last published, then drives the
//! build → upload → manifest → log → changelog cycle against an object store.
//!
//! ## Layer 1 - Domain
//!
//! - `VersionSet` / `FileVersion`: local scans and remote manifests
//! - `compare`: the publish decision
//! - `PublishLogStore`: append-only, retention-pruned publish history
//! - `PublishCoordinator`: one publish cycle as an explicit state machine
//! - `UpdateChecker`: the same comparison, from an installed client's side

pub mod builder;
pub mod changelog;
pub mod client;
pub mod codec;
pub mod comparator;
pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod domain;
pub mod metrics;
pub mod obs;
pub mod publish_log;
pub mod remote;
pub mod scan;
pub mod telemetry;

pub use builder::{BuildRequest, BuiltArtifact, FakeInstallerBuilder, InstallerBuilder};
pub use changelog::{rebuild_changelog, ChangelogRenderer, HtmlChangelogRenderer, RenderedDocument};
pub use client::{find_updates, ComponentUpdate, UpdateChecker};
pub use comparator::{compare, DecisionReason, PublishDecision};
pub use config::{
    InstallerConfig, InstallerKind, PublishConfig, StorageBackend, StorageConfig, SuccessCode,
};
pub use coordinator::{CycleFailure, CycleOutcome, CycleReport, CycleState, PublishCoordinator};
pub use credentials::{open_store, StorageCredentials};
pub use domain::{
    DeliverError, FileVersion, FileVersionEntry, Provenance, Result, VersionParseError, VersionSet,
};
pub use publish_log::{PruneReport, PublishLog, PublishLogEntry, PublishLogStore};
pub use remote::RemoteLayout;
pub use scan::{FileMatcher, PeVersionProbe, ScanOptions, StaticVersionProbe, VersionProbe};
pub use telemetry::init_tracing;
