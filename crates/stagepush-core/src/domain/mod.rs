//! Domain models for stagepush.
//!
//! Canonical definitions for the core values:
//! - `FileVersion`: four-component file version with component-wise ordering
//! - `FileVersionEntry` / `VersionSet`: filename → version mapping, local or remote
//! - `DeliverError`: error taxonomy shared by every publish step

pub mod error;
pub mod version;
pub mod version_set;

pub use error::{DeliverError, Result};
pub use version::{FileVersion, VersionParseError};
pub use version_set::{FileVersionEntry, Provenance, VersionSet};
