//! Version stamping for third-party installer scripts.

use std::io::Write;
use std::path::Path;

use stagepush_core::{DeliverError, Result};
use tracing::debug;

/// Replace zero-based line `line` of `script` with `version`.
///
/// Line endings (LF or CRLF) and a trailing newline are preserved. The file
/// is rewritten atomically.
pub fn patch_version_line(script: &Path, line: usize, version: &str) -> Result<()> {
    let text = std::fs::read_to_string(script).map_err(|e| {
        DeliverError::BuildFailure(format!("cannot read script {}: {e}", script.display()))
    })?;

    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let trailing = text.ends_with('\n');
    let mut lines: Vec<&str> = text.lines().collect();
    let total = lines.len();

    let slot = lines.get_mut(line).ok_or_else(|| {
        DeliverError::Configuration(format!(
            "installer.version_line {line} is past the end of {} ({total} lines)",
            script.display()
        ))
    })?;
    *slot = version;

    let mut patched = lines.join(newline);
    if trailing {
        patched.push_str(newline);
    }

    let dir = script
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(patched.as_bytes())?;
    tmp.persist(script).map_err(|e| DeliverError::Io(e.error))?;
    debug!(script = %script.display(), line, version, "script version patched");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_only_the_target_line() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("p.deploy");
        std::fs::write(&script, "0\n1\n2\n3\n4\n5\nOLD\n7\n").unwrap();
        patch_version_line(&script, 6, "3.2.1.0").unwrap();
        assert_eq!(
            std::fs::read_to_string(&script).unwrap(),
            "0\n1\n2\n3\n4\n5\n3.2.1.0\n7\n"
        );
    }

    #[test]
    fn test_crlf_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("p.deploy");
        std::fs::write(&script, "head\r\nOLD\r\ntail").unwrap();
        patch_version_line(&script, 1, "9.9.9.9").unwrap();
        assert_eq!(
            std::fs::read_to_string(&script).unwrap(),
            "head\r\n9.9.9.9\r\ntail"
        );
    }

    #[test]
    fn test_short_script_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("p.deploy");
        std::fs::write(&script, "only\n").unwrap();
        let err = patch_version_line(&script, 6, "1.0.0.0").unwrap_err();
        assert!(matches!(err, DeliverError::Configuration(_)));
        assert_eq!(std::fs::read_to_string(&script).unwrap(), "only\n");
    }

    #[test]
    fn test_missing_script_is_build_failure() {
        let err = patch_version_line(Path::new("/no/script.deploy"), 0, "1.0").unwrap_err();
        assert!(matches!(err, DeliverError::BuildFailure(_)));
    }
}
