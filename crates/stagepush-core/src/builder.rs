//! Installer-builder capability consumed by the publish cycle.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::PublishConfig;
use crate::domain::{DeliverError, Result};

/// Inputs for one installer build.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub config: &'a PublishConfig,
    /// Resolved product version, e.g. `"3.1.4.0"`.
    pub product_version: &'a str,
}

/// What a builder produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltArtifact {
    pub path: PathBuf,
    /// Exit code; in-process builders report `Some(0)`. `None` when the
    /// packager was killed by a signal.
    pub exit_code: Option<i32>,
}

/// Produces the installer artifact.
///
/// Implementations report the raw exit code; the publish cycle decides
/// whether it matches the configured success code.
#[async_trait]
pub trait InstallerBuilder: Send + Sync {
    async fn build(&self, request: &BuildRequest<'_>) -> Result<BuiltArtifact>;
}

/// Test builder: writes a small artifact to `installer.output` and reports a
/// fixed exit code.
#[derive(Debug)]
pub struct FakeInstallerBuilder {
    exit_code: Option<i32>,
    write_output: bool,
    error: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl Default for FakeInstallerBuilder {
    fn default() -> Self {
        Self::new(Some(0))
    }
}

impl FakeInstallerBuilder {
    pub fn new(exit_code: Option<i32>) -> Self {
        Self {
            exit_code,
            write_output: true,
            error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Report success without writing the artifact.
    pub fn without_output(mut self) -> Self {
        self.write_output = false;
        self
    }

    /// Fail every build with `BuildFailure(message)`.
    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Product versions passed to each `build` call.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InstallerBuilder for FakeInstallerBuilder {
    async fn build(&self, request: &BuildRequest<'_>) -> Result<BuiltArtifact> {
        self.calls
            .lock()
            .unwrap()
            .push(request.product_version.to_string());
        if let Some(message) = &self.error {
            return Err(DeliverError::BuildFailure(message.clone()));
        }

        let path = request.config.installer.output.clone();
        if self.write_output {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let body = format!("installer {}", request.product_version);
            tokio::fs::write(&path, body.as_bytes()).await?;
        }
        Ok(BuiltArtifact {
            path,
            exit_code: self.exit_code,
        })
    }
}
