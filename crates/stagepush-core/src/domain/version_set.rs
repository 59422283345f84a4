//! `VersionSet`: filename → version mapping for one side of a comparison.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blobstate::ObjectStore;
use serde::Serialize;

use super::error::{DeliverError, Result};
use super::version::FileVersion;
use crate::codec;
use crate::scan::{self, ScanOptions, VersionProbe};

/// Where a `VersionSet` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Inspected from files in a staging directory.
    Local,
    /// Decoded from a previously published manifest.
    Remote,
}

/// One filename/version pair. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileVersionEntry {
    filename: String,
    version: FileVersion,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    unparsed: bool,
}

impl FileVersionEntry {
    pub fn new(filename: impl Into<String>, version: FileVersion) -> Self {
        Self {
            filename: filename.into(),
            version,
            unparsed: false,
        }
    }

    /// A published entry whose version text could not be parsed.
    ///
    /// Displays as `0.0.0.0` but orders below every valid version.
    pub fn unparsed(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            version: FileVersion::ZERO,
            unparsed: true,
        }
    }

    /// Filename as originally seen (case preserved).
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn version(&self) -> FileVersion {
        self.version
    }

    /// Version used for ordering; `None` (lowest) when unparsed.
    pub fn ordering_version(&self) -> Option<FileVersion> {
        (!self.unparsed).then_some(self.version)
    }

    /// Case-folded join key.
    pub fn key(&self) -> String {
        fold(&self.filename)
    }
}

pub(crate) fn fold(filename: &str) -> String {
    filename.to_lowercase()
}

/// Ordered set of [`FileVersionEntry`] with unique, case-insensitive filenames.
///
/// Iteration order is by case-folded filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSet {
    provenance: Provenance,
    entries: BTreeMap<String, FileVersionEntry>,
}

impl VersionSet {
    pub fn empty(provenance: Provenance) -> Self {
        Self {
            provenance,
            entries: BTreeMap::new(),
        }
    }

    /// Build a set from entries, rejecting filenames that collide case-insensitively.
    pub fn try_from_entries(
        provenance: Provenance,
        entries: impl IntoIterator<Item = FileVersionEntry>,
    ) -> Result<Self> {
        let mut set = Self::empty(provenance);
        for entry in entries {
            set.insert(entry)?;
        }
        Ok(set)
    }

    /// Scan a staging directory. Files without readable version metadata are skipped.
    pub fn from_local_directory(
        path: &Path,
        options: &ScanOptions,
        probe: &dyn VersionProbe,
    ) -> Result<Self> {
        scan::scan_directory(path, options, probe)
    }

    /// [`Self::from_local_directory`] on the blocking pool.
    pub async fn scan_local_directory(
        path: PathBuf,
        options: ScanOptions,
        probe: Arc<dyn VersionProbe>,
    ) -> Result<Self> {
        let root = path.clone();
        tokio::task::spawn_blocking(move || {
            scan::scan_directory(&root, &options, probe.as_ref())
        })
        .await
        .map_err(|e| DeliverError::LocalScan {
            path,
            reason: format!("scan task failed: {e}"),
        })?
    }

    /// Fetch and decode the manifest at `key`. A missing manifest yields an empty set.
    pub async fn from_remote_manifest(store: &dyn ObjectStore, key: &str) -> Result<Self> {
        let exists = store
            .exists(key)
            .await
            .map_err(|e| DeliverError::transport("read_manifest", e))?;
        if !exists {
            return Ok(Self::empty(Provenance::Remote));
        }

        let bytes = store
            .download(key)
            .await
            .map_err(|e| DeliverError::transport("read_manifest", e))?;
        codec::decode_manifest(&bytes)
    }

    pub fn insert(&mut self, entry: FileVersionEntry) -> Result<()> {
        let key = entry.key();
        if let Some(existing) = self.entries.get(&key) {
            return Err(DeliverError::Manifest(format!(
                "duplicate filename '{}' (already present as '{}')",
                entry.filename(),
                existing.filename()
            )));
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Case-insensitive lookup.
    pub fn get(&self, filename: &str) -> Option<&FileVersionEntry> {
        self.entries.get(&fold(filename))
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.entries.contains_key(&fold(filename))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileVersionEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries satisfying `keep`, same provenance.
    pub fn subset<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&FileVersionEntry) -> bool,
    {
        Self {
            provenance: self.provenance,
            entries: self
                .entries
                .iter()
                .filter(|(_, e)| keep(e))
                .map(|(k, e)| (k.clone(), e.clone()))
                .collect(),
        }
    }

    /// `(filename, version)` pairs in iteration order, ignoring provenance.
    pub fn pairs(&self) -> Vec<(String, FileVersion)> {
        self.iter()
            .map(|e| (e.filename().to_string(), e.version()))
            .collect()
    }

    /// Same filename/version pairs, regardless of provenance.
    pub fn same_entries(&self, other: &VersionSet) -> bool {
        self.entries == other.entries
    }
}

impl<'a> IntoIterator for &'a VersionSet {
    type Item = &'a FileVersionEntry;
    type IntoIter = std::collections::btree_map::Values<'a, String, FileVersionEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}
