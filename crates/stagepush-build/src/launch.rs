//! Launch configuration for external packagers, plus pre-run transforms.
//!
//! A transform takes a [`LaunchConfig`] and returns the one actually run.
//! Transforms are composed in order by [`prepare`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use stagepush_core::{BuildRequest, DeliverError, Result};

use crate::script_patch::patch_version_line;

/// One external process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// 0 waits indefinitely.
    pub timeout_secs: u64,
}

impl LaunchConfig {
    /// Launch settings straight from `[installer]`, arguments split shell-style.
    pub fn from_request(request: &BuildRequest<'_>) -> Result<Self> {
        let installer = &request.config.installer;
        let executable = installer.executable.clone().ok_or_else(|| {
            DeliverError::Configuration(format!(
                "installer.executable is required for kind '{}'",
                installer.kind
            ))
        })?;
        let args = shell_words::split(&installer.arguments).map_err(|e| {
            DeliverError::Configuration(format!(
                "cannot parse installer.arguments '{}': {e}",
                installer.arguments
            ))
        })?;
        Ok(Self {
            executable,
            args,
            working_dir: None,
            timeout_secs: installer.timeout_secs,
        })
    }

    /// Command line as one string, for logs and error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.executable.display().to_string()];
        parts.extend(self.args.iter().cloned());
        shell_words::join(parts)
    }
}

/// A pre-run transform.
pub type PreRun = fn(LaunchConfig, &BuildRequest<'_>) -> Result<LaunchConfig>;

/// Write the product version into the tool script, then run the tool as
/// `<executable> "<script>" <tool_args...>` from the script's directory.
pub fn patch_tool_script(launch: LaunchConfig, request: &BuildRequest<'_>) -> Result<LaunchConfig> {
    let installer = &request.config.installer;
    let script = installer.script_path.clone().ok_or_else(|| {
        DeliverError::Configuration(
            "installer.script_path is required for kind 'third_party_tool'".to_string(),
        )
    })?;

    patch_version_line(&script, installer.version_line, request.product_version)?;

    let mut args = vec![script.display().to_string()];
    args.extend(installer.tool_args.iter().cloned());
    Ok(LaunchConfig {
        args,
        working_dir: script.parent().map(|p| p.to_path_buf()),
        ..launch
    })
}

/// Build the base launch config and apply `transforms` in order.
pub fn prepare(request: &BuildRequest<'_>, transforms: &[PreRun]) -> Result<LaunchConfig> {
    transforms
        .iter()
        .try_fold(LaunchConfig::from_request(request)?, |launch, transform| {
            transform(launch, request)
        })
}
