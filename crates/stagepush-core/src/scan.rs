//! Local staging-directory scan and embedded version probes.

use std::collections::HashMap;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use goblin::Object;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::version_set::fold;
use crate::domain::{DeliverError, FileVersion, FileVersionEntry, Provenance, Result, VersionSet};

/// Which files in the staging directory carry product versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Glob masks matched case-insensitively against file names.
    pub masks: Vec<String>,
    pub recursive: bool,
    /// Masks for non-product artifacts that match `masks` anyway.
    pub exclude: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            masks: vec!["*.exe".to_string(), "*.dll".to_string()],
            recursive: false,
            exclude: vec!["*.vshost.exe".to_string()],
        }
    }
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compiled form of [`ScanOptions`] masks.
#[derive(Debug, Clone)]
pub struct FileMatcher {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl FileMatcher {
    pub fn new(options: &ScanOptions) -> Result<Self> {
        Ok(Self {
            include: compile(&options.masks)?,
            exclude: compile(&options.exclude)?,
        })
    }

    /// True when `file_name` matches an include mask and no exclude mask.
    pub fn matches(&self, file_name: &str) -> bool {
        self.include
            .iter()
            .any(|p| p.matches_with(file_name, MATCH_OPTIONS))
            && !self
                .exclude
                .iter()
                .any(|p| p.matches_with(file_name, MATCH_OPTIONS))
    }
}

fn compile(masks: &[String]) -> Result<Vec<Pattern>> {
    masks
        .iter()
        .map(|m| {
            Pattern::new(m)
                .map_err(|e| DeliverError::Configuration(format!("invalid file mask '{m}': {e}")))
        })
        .collect()
}

/// Reads embedded version metadata from a file.
///
/// `Ok(None)` means the file carries no version; the scan skips it.
pub trait VersionProbe: Send + Sync {
    fn read_version(&self, path: &Path) -> Result<Option<FileVersion>>;
}

/// Walk `root` and build the local [`VersionSet`].
pub(crate) fn scan_directory(
    root: &Path,
    options: &ScanOptions,
    probe: &dyn VersionProbe,
) -> Result<VersionSet> {
    if !root.is_dir() {
        return Err(DeliverError::Configuration(format!(
            "staging directory {} does not exist",
            root.display()
        )));
    }

    let matcher = FileMatcher::new(options)?;
    let max_depth = if options.recursive { usize::MAX } else { 1 };
    let mut set = VersionSet::empty(Provenance::Local);

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable staging entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !matcher.matches(&file_name) {
            continue;
        }

        let version = match probe.read_version(entry.path()) {
            Ok(Some(version)) => version,
            Ok(None) => {
                debug!(file = %file_name, "no version metadata, skipping");
                continue;
            }
            Err(e) => {
                warn!(file = %file_name, error = %e, "unreadable version metadata, skipping");
                continue;
            }
        };

        if let Some(existing) = set.get(&file_name) {
            warn!(
                file = %entry.path().display(),
                kept = %existing.filename(),
                "filename already scanned, keeping the first"
            );
            continue;
        }
        set.insert(FileVersionEntry::new(file_name, version))?;
    }

    Ok(set)
}

const FIXED_FILE_INFO_SIGNATURE: u32 = 0xFEEF_04BD;
const FIXED_FILE_INFO_STRUC_VERSION: u32 = 0x0001_0000;
const FIXED_FILE_INFO_LEN: usize = 52;
/// `wLength`, `wValueLength`, `wType` ahead of the key.
const VERSION_INFO_HEADER_LEN: usize = 6;

/// Reads the file version from a Windows PE resource section.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeVersionProbe;

impl PeVersionProbe {
    /// Version from the `VS_VERSION_INFO` resource of a PE image.
    ///
    /// Anything that is not a PE image, or has no such resource in `.rsrc`,
    /// has no version.
    pub fn version_from_bytes(bytes: &[u8]) -> Option<FileVersion> {
        let pe = match Object::parse(bytes) {
            Ok(Object::PE(pe)) => pe,
            Ok(_) => return None,
            Err(e) => {
                debug!(error = %e, "not a PE image");
                return None;
            }
        };
        let rsrc = pe
            .sections
            .iter()
            .find(|section| section.name().ok() == Some(".rsrc"))?;
        let start = rsrc.pointer_to_raw_data as usize;
        let end = start
            .checked_add(rsrc.size_of_raw_data as usize)?
            .min(bytes.len());
        fixed_file_info(bytes.get(start..end)?)
    }
}

/// Parse the `VS_FIXEDFILEINFO` value of the first `VS_VERSION_INFO` block in
/// a resource section.
fn fixed_file_info(rsrc: &[u8]) -> Option<FileVersion> {
    let key: Vec<u8> = "VS_VERSION_INFO\0"
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect();
    let block = rsrc
        .windows(key.len())
        .position(|w| w == key.as_slice())?
        .checked_sub(VERSION_INFO_HEADER_LEN)?;

    let half = |at: usize| -> Option<u16> {
        rsrc.get(at..at + 2)
            .and_then(|b| <[u8; 2]>::try_from(b).ok())
            .map(u16::from_le_bytes)
    };
    let word = |at: usize| -> Option<u32> {
        rsrc.get(at..at + 4)
            .and_then(|b| <[u8; 4]>::try_from(b).ok())
            .map(u32::from_le_bytes)
    };

    if usize::from(half(block + 2)?) < FIXED_FILE_INFO_LEN {
        return None;
    }
    // value is DWORD-aligned after the key
    let value = block + ((VERSION_INFO_HEADER_LEN + key.len() + 3) & !3);
    if word(value)? != FIXED_FILE_INFO_SIGNATURE
        || word(value + 4)? != FIXED_FILE_INFO_STRUC_VERSION
    {
        return None;
    }
    let (ms, ls) = (word(value + 8)?, word(value + 12)?);
    Some(FileVersion::new(ms >> 16, ms & 0xffff, ls >> 16, ls & 0xffff))
}

impl VersionProbe for PeVersionProbe {
    fn read_version(&self, path: &Path) -> Result<Option<FileVersion>> {
        let bytes = std::fs::read(path).map_err(|e| DeliverError::LocalScan {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self::version_from_bytes(&bytes))
    }
}

/// Fixed filename → version table. Files not in the table carry no version.
#[derive(Debug, Clone, Default)]
pub struct StaticVersionProbe {
    versions: HashMap<String, FileVersion>,
}

impl StaticVersionProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filename: &str, version: FileVersion) -> Self {
        self.versions.insert(fold(filename), version);
        self
    }
}

impl VersionProbe for StaticVersionProbe {
    fn read_version(&self, path: &Path) -> Result<Option<FileVersion>> {
        let name = path
            .file_name()
            .map(|n| fold(&n.to_string_lossy()))
            .unwrap_or_default();
        Ok(self.versions.get(&name).copied())
    }
}
