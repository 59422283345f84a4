//! Zip installers built from the staging directory.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use stagepush_core::scan::FileMatcher;
use stagepush_core::{DeliverError, Result};
use tracing::info;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Every file under `root`, recursively, sorted.
pub fn collect_tree(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| DeliverError::BuildFailure(format!("cannot walk {}: {e}", root.display())))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Top-level files in `root` accepted by `matcher`, sorted.
pub fn collect_top_level(root: &Path, matcher: &FileMatcher) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| DeliverError::BuildFailure(format!("cannot walk {}: {e}", root.display())))?;
        if entry.file_type().is_file() && matcher.matches(&entry.file_name().to_string_lossy()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Deepest directory containing every file in `files`.
pub fn common_base_path(files: &[PathBuf]) -> Option<PathBuf> {
    let mut iter = files.iter().filter_map(|f| f.parent());
    let mut base = iter.next()?.to_path_buf();
    for dir in iter {
        while !dir.starts_with(&base) {
            if !base.pop() {
                return None;
            }
        }
    }
    Some(base)
}

/// Archive entry name for `file`: relative to `base`, `/`-separated.
fn entry_name(base: &Path, file: &Path) -> Result<String> {
    let relative = file.strip_prefix(base).map_err(|_| {
        DeliverError::BuildFailure(format!(
            "{} is outside {}",
            file.display(),
            base.display()
        ))
    })?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}

fn write_zip(output: &Path, files: &[PathBuf]) -> Result<usize> {
    if files.is_empty() {
        return Err(DeliverError::BuildFailure(
            "nothing to package: no files matched".to_string(),
        ));
    }
    let base = common_base_path(files)
        .ok_or_else(|| DeliverError::BuildFailure("files share no common directory".to_string()))?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let zip_err = |e: zip::result::ZipError| {
        DeliverError::BuildFailure(format!("cannot write {}: {e}", output.display()))
    };

    let mut writer = ZipWriter::new(File::create(output)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for file in files {
        writer.start_file(entry_name(&base, file)?, options).map_err(zip_err)?;
        let mut source = File::open(file)?;
        io::copy(&mut source, &mut writer)?;
    }
    writer.finish().map_err(zip_err)?;
    Ok(files.len())
}

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Zip `files` into `output`, replacing any previous archive.
///
/// `output` itself is never packaged.
pub async fn zip_files(output: &Path, files: Vec<PathBuf>) -> Result<()> {
    let output = absolute(output)?;
    if output.exists() {
        tokio::fs::remove_file(&output).await?;
    }
    let files: Vec<PathBuf> = files
        .into_iter()
        .filter(|f| absolute(f).map_or(true, |f| f != output))
        .collect();

    let target = output.clone();
    let count = tokio::task::spawn_blocking(move || write_zip(&target, &files))
        .await
        .map_err(|e| DeliverError::BuildFailure(format!("zip task failed: {e}")))??;
    info!(output = %output.display(), files = count, "installer archive written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_base_path() {
        let files = vec![
            PathBuf::from("/stage/bin/a.exe"),
            PathBuf::from("/stage/bin/lib/b.dll"),
            PathBuf::from("/stage/bin/c.dll"),
        ];
        assert_eq!(common_base_path(&files), Some(PathBuf::from("/stage/bin")));

        let files = vec![
            PathBuf::from("/stage/x/a.exe"),
            PathBuf::from("/stage/y/b.dll"),
        ];
        assert_eq!(common_base_path(&files), Some(PathBuf::from("/stage")));
        assert_eq!(common_base_path(&[]), None);
    }

    #[test]
    fn test_entry_names_use_forward_slashes() {
        let name = entry_name(Path::new("/stage"), Path::new("/stage/lib/x/b.dll")).unwrap();
        assert_eq!(name, "lib/x/b.dll");
    }

    #[tokio::test]
    async fn test_empty_file_list_is_build_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = zip_files(&dir.path().join("out.zip"), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeliverError::BuildFailure(_)));
    }
}
