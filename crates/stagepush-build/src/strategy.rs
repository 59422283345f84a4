//! Installer strategies and the builder that dispatches over them.

use async_trait::async_trait;
use stagepush_core::scan::FileMatcher;
use stagepush_core::{
    BuildRequest, BuiltArtifact, DeliverError, InstallerBuilder, InstallerKind, Result,
};
use tracing::warn;

use crate::archive::{collect_top_level, collect_tree, zip_files};
use crate::launch::{patch_tool_script, prepare, PreRun};
use crate::runner::ProcessRunner;

const TOOL_SCRIPT_PRE_RUN: &[PreRun] = &[patch_tool_script];

/// How to produce the installer. One variant per [`InstallerKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerStrategy {
    /// Run the configured packager.
    Process,
    /// Zip the whole staging tree.
    ZipFile,
    /// Zip the top-level staging files matching the scan masks.
    BuildOutputZip,
    /// Stamp the version into the tool script, then run the tool.
    ThirdPartyTool,
}

impl From<InstallerKind> for InstallerStrategy {
    fn from(kind: InstallerKind) -> Self {
        match kind {
            InstallerKind::Process => InstallerStrategy::Process,
            InstallerKind::ZipFile => InstallerStrategy::ZipFile,
            InstallerKind::BuildOutputZip => InstallerStrategy::BuildOutputZip,
            InstallerKind::ThirdPartyTool => InstallerStrategy::ThirdPartyTool,
        }
    }
}

impl InstallerStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            InstallerStrategy::Process => "process",
            InstallerStrategy::ZipFile => "zip_file",
            InstallerStrategy::BuildOutputZip => "build_output_zip",
            InstallerStrategy::ThirdPartyTool => "third_party_tool",
        }
    }

    /// Launch transforms applied before running the packager.
    fn pre_run(&self) -> &'static [PreRun] {
        match self {
            InstallerStrategy::ThirdPartyTool => TOOL_SCRIPT_PRE_RUN,
            _ => &[],
        }
    }

    pub async fn build(&self, request: &BuildRequest<'_>) -> Result<BuiltArtifact> {
        let config = request.config;
        let output = config.installer.output.clone();

        let exit_code = match self {
            InstallerStrategy::Process | InstallerStrategy::ThirdPartyTool => {
                let launch = prepare(request, self.pre_run())?;
                let run = ProcessRunner::run(&launch).await?;
                if !run.succeeded() && !run.stderr.trim().is_empty() {
                    warn!(stderr = %run.stderr.trim(), "packager reported errors");
                }
                run.exit_code
            }
            InstallerStrategy::ZipFile => {
                let files = collect_tree(&config.staging_path)?;
                zip_files(&output, files).await?;
                Some(0)
            }
            InstallerStrategy::BuildOutputZip => {
                let matcher = FileMatcher::new(&config.scan)?;
                let files = collect_top_level(&config.staging_path, &matcher)?;
                zip_files(&output, files).await?;
                Some(0)
            }
        };

        if !output.is_file() && exit_code == Some(0) {
            return Err(DeliverError::BuildFailure(format!(
                "{} builder finished but {} does not exist",
                self.name(),
                output.display()
            )));
        }

        Ok(BuiltArtifact {
            path: output,
            exit_code,
        })
    }
}

/// [`InstallerBuilder`] that picks the strategy from `installer.kind`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyBuilder;

#[async_trait]
impl InstallerBuilder for StrategyBuilder {
    async fn build(&self, request: &BuildRequest<'_>) -> Result<BuiltArtifact> {
        InstallerStrategy::from(request.config.installer.kind)
            .build(request)
            .await
    }
}
