//! Client-side update check: compares an installed copy against the
//! published manifest.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use blobstate::ObjectStore;
use serde::Serialize;
use tracing::info;

use crate::domain::{DeliverError, FileVersion, Result, VersionSet};
use crate::remote::{guarded, remote_call, RemoteLayout};
use crate::scan::{ScanOptions, VersionProbe};

/// One component that is newer (or only present) remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentUpdate {
    pub filename: String,
    /// `None` when the component is not installed.
    pub installed: Option<FileVersion>,
    pub available: FileVersion,
}

/// Components where the published version beats the installed one, plus
/// published components missing locally. Ordered by filename.
pub fn find_updates(installed: &VersionSet, published: &VersionSet) -> Vec<ComponentUpdate> {
    published
        .iter()
        .filter_map(|remote| match installed.get(remote.filename()) {
            Some(local) if remote.ordering_version() > local.ordering_version() => {
                Some(ComponentUpdate {
                    filename: remote.filename().to_string(),
                    installed: Some(local.version()),
                    available: remote.version(),
                })
            }
            Some(_) => None,
            None => Some(ComponentUpdate {
                filename: remote.filename().to_string(),
                installed: None,
                available: remote.version(),
            }),
        })
        .collect()
}

pub struct UpdateChecker<'a> {
    store: &'a dyn ObjectStore,
    layout: RemoteLayout,
    timeout: Duration,
}

impl<'a> UpdateChecker<'a> {
    pub fn new(store: &'a dyn ObjectStore, product_name: &str, timeout: Duration) -> Self {
        Self {
            store,
            layout: RemoteLayout::new(product_name),
            timeout,
        }
    }

    /// Scan `install_dir` and list available updates.
    pub async fn check(
        &self,
        install_dir: &Path,
        options: &ScanOptions,
        probe: Arc<dyn VersionProbe>,
    ) -> Result<Vec<ComponentUpdate>> {
        let installed = VersionSet::scan_local_directory(
            install_dir.to_path_buf(),
            options.clone(),
            probe,
        )
        .await?;
        let published = guarded(
            "read_manifest",
            self.timeout,
            VersionSet::from_remote_manifest(self.store, &self.layout.manifest_key()),
        )
        .await?;
        let updates = find_updates(&installed, &published);
        info!(
            product = %self.layout.product(),
            updates = updates.len(),
            "update check complete"
        );
        Ok(updates)
    }

    /// Download the installer blob `artifact_key` into `destination`.
    ///
    /// `destination` may be a directory, in which case the blob keeps its name.
    pub async fn download_installer(&self, artifact_key: &str, destination: &Path) -> Result<PathBuf> {
        let target = if destination.is_dir() {
            destination.join(artifact_key.rsplit('/').next().unwrap_or(artifact_key))
        } else {
            destination.to_path_buf()
        };

        let bytes = remote_call(
            "download_installer",
            self.timeout,
            self.store.download(artifact_key),
        )
        .await?;
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &bytes).await.map_err(DeliverError::Io)?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::domain::{FileVersionEntry, Provenance};
    use crate::scan::StaticVersionProbe;
    use blobstate::fakes::MemoryObjectStore;
    use blobstate::BlobMetadata;

    fn set(provenance: Provenance, pairs: &[(&str, &str)]) -> VersionSet {
        VersionSet::try_from_entries(
            provenance,
            pairs
                .iter()
                .map(|(n, v)| FileVersionEntry::new(*n, FileVersion::parse(v).unwrap())),
        )
        .unwrap()
    }

    #[test]
    fn test_find_updates_newer_and_missing() {
        let installed = set(Provenance::Local, &[("a.exe", "1.0"), ("b.dll", "2.0"), ("old.dll", "1.0")]);
        let published = set(Provenance::Remote, &[("A.exe", "1.1"), ("b.dll", "1.9"), ("c.dll", "1.0")]);

        let updates = find_updates(&installed, &published);
        assert_eq!(
            updates,
            vec![
                ComponentUpdate {
                    filename: "A.exe".to_string(),
                    installed: Some(FileVersion::new(1, 0, 0, 0)),
                    available: FileVersion::new(1, 1, 0, 0),
                },
                ComponentUpdate {
                    filename: "c.dll".to_string(),
                    installed: None,
                    available: FileVersion::new(1, 0, 0, 0),
                },
            ]
        );
    }

    #[test]
    fn test_up_to_date_has_no_updates() {
        let installed = set(Provenance::Local, &[("a.exe", "1.0")]);
        assert!(find_updates(&installed, &installed).is_empty());
    }

    #[tokio::test]
    async fn test_check_against_store_and_download() {
        let store = MemoryObjectStore::new();
        let published = set(Provenance::Local, &[("app.exe", "2.0.0.0")]);
        store
            .upload(
                "Acme.VersionInfo.xml",
                &codec::encode_manifest(&published).unwrap(),
                &BlobMetadata::default(),
            )
            .await
            .unwrap();
        store
            .upload("Acme.zip", b"PK\x03\x04", &BlobMetadata::default())
            .await
            .unwrap();

        let install = tempfile::tempdir().unwrap();
        std::fs::write(install.path().join("app.exe"), b"MZ").unwrap();
        let probe = StaticVersionProbe::new().with("app.exe", FileVersion::new(1, 5, 0, 0));

        let checker = UpdateChecker::new(&store, "Acme", Duration::from_secs(5));
        let updates = checker
            .check(install.path(), &ScanOptions::default(), Arc::new(probe))
            .await
            .unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].available, FileVersion::new(2, 0, 0, 0));

        let downloads = tempfile::tempdir().unwrap();
        let path = checker
            .download_installer("Acme.zip", downloads.path())
            .await
            .unwrap();
        assert_eq!(path, downloads.path().join("Acme.zip"));
        assert_eq!(std::fs::read(path).unwrap(), b"PK\x03\x04");
    }
}
