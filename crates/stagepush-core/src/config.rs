//! Strongly-typed publish configuration, loaded from TOML.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::{DeliverError, Result};
use crate::publish_log::DEFAULT_RETENTION;
use crate::remote::RemoteLayout;
use crate::scan::ScanOptions;

/// How the installer artifact is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallerKind {
    /// Run an arbitrary packager process.
    Process,
    /// Zip the whole staging tree.
    ZipFile,
    /// Zip only the top-level files matching the scan masks.
    BuildOutputZip,
    /// Patch the product version into a tool script, then run the tool on it.
    ThirdPartyTool,
}

impl fmt::Display for InstallerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstallerKind::Process => "process",
            InstallerKind::ZipFile => "zip_file",
            InstallerKind::BuildOutputZip => "build_output_zip",
            InstallerKind::ThirdPartyTool => "third_party_tool",
        };
        f.write_str(s)
    }
}

/// Expected builder exit status.
///
/// In TOML: an integer, or `-1` / `"ignore"` to accept any exit code.
/// Unset means ignore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SuccessCode {
    #[default]
    Ignore,
    Code(i32),
}

impl SuccessCode {
    /// Whether `exit_code` counts as success. A missing code (killed by a
    /// signal) only passes when exit codes are ignored.
    pub fn accepts(&self, exit_code: Option<i32>) -> bool {
        match self {
            SuccessCode::Ignore => true,
            SuccessCode::Code(expected) => exit_code == Some(*expected),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SuccessCodeRepr {
    Int(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for SuccessCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match SuccessCodeRepr::deserialize(deserializer)? {
            SuccessCodeRepr::Int(-1) => Ok(SuccessCode::Ignore),
            SuccessCodeRepr::Int(n) => i32::try_from(n)
                .map(SuccessCode::Code)
                .map_err(|_| serde::de::Error::custom(format!("success_code {n} out of range"))),
            SuccessCodeRepr::Text(s) if s.eq_ignore_ascii_case("ignore") => Ok(SuccessCode::Ignore),
            SuccessCodeRepr::Text(s) => Err(serde::de::Error::custom(format!(
                "success_code must be an integer or \"ignore\", got \"{s}\""
            ))),
        }
    }
}

impl Serialize for SuccessCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SuccessCode::Ignore => serializer.serialize_str("ignore"),
            SuccessCode::Code(n) => serializer.serialize_i32(*n),
        }
    }
}

fn default_version_line() -> usize {
    6
}

fn default_tool_args() -> Vec<String> {
    vec!["/b".to_string(), "/q".to_string()]
}

fn default_retention() -> usize {
    DEFAULT_RETENTION
}

fn default_storage_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerConfig {
    pub kind: InstallerKind,
    /// Packager or tool executable (`process`, `third_party_tool`).
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// Command line passed to `executable`, split shell-style.
    #[serde(default)]
    pub arguments: String,
    /// The artifact the build produces and the cycle uploads.
    pub output: PathBuf,
    #[serde(default)]
    pub success_code: SuccessCode,
    /// Tool script patched with the product version (`third_party_tool`).
    #[serde(default)]
    pub script_path: Option<PathBuf>,
    /// Zero-based script line replaced by the product version.
    #[serde(default = "default_version_line")]
    pub version_line: usize,
    /// Arguments following the quoted script path.
    #[serde(default = "default_tool_args")]
    pub tool_args: Vec<String>,
    /// Build timeout; 0 waits indefinitely.
    #[serde(default)]
    pub timeout_secs: u64,
}

/// Where published blobs live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageBackend {
    Filesystem {
        root: PathBuf,
    },
    Azure {
        account_name: String,
        container: String,
        #[serde(default)]
        sas_token: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Credential file that overrides inline account settings when present.
    #[serde(default)]
    pub local_credential_path: Option<PathBuf>,
    /// Per-call timeout; 0 waits indefinitely.
    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

/// Everything one publish cycle needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    pub product_name: String,
    pub staging_path: PathBuf,
    /// Staging file whose version becomes the product version.
    pub product_version_file: String,
    pub installer: InstallerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub scan: ScanOptions,
    /// Log entries kept for the changelog.
    #[serde(default = "default_retention")]
    pub retention: usize,
}

fn absolutize(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

impl PublishConfig {
    /// Read, parse and validate a config file. Relative paths resolve
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DeliverError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| DeliverError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        absolutize(base, &mut self.staging_path);
        absolutize(base, &mut self.installer.output);
        if let Some(script) = self.installer.script_path.as_mut() {
            absolutize(base, script);
        }
        if let Some(creds) = self.storage.local_credential_path.as_mut() {
            absolutize(base, creds);
        }
        if let StorageBackend::Filesystem { root } = &mut self.storage.backend {
            absolutize(base, root);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(DeliverError::Configuration(msg.to_string()));

        let product = self.product_name.trim();
        if product.is_empty() {
            return fail("product_name is required");
        }
        if product.contains(['/', '\\']) {
            return fail("product_name must not contain path separators");
        }
        if self.staging_path.as_os_str().is_empty() {
            return fail("staging_path is required");
        }
        if self.product_version_file.trim().is_empty() {
            return fail("product_version_file is required");
        }
        if self.retention == 0 {
            return fail("retention must be at least 1");
        }
        if self.scan.masks.is_empty() {
            return fail("scan.masks must name at least one mask");
        }
        if self.installer.output.as_os_str().is_empty() {
            return fail("installer.output is required");
        }

        match self.installer.kind {
            InstallerKind::Process | InstallerKind::ThirdPartyTool
                if self.installer.executable.is_none() =>
            {
                return Err(DeliverError::Configuration(format!(
                    "installer.executable is required for kind '{}'",
                    self.installer.kind
                )));
            }
            InstallerKind::ThirdPartyTool if self.installer.script_path.is_none() => {
                return fail("installer.script_path is required for kind 'third_party_tool'");
            }
            _ => {}
        }

        match &self.storage.backend {
            StorageBackend::Azure {
                account_name,
                container,
                ..
            } => {
                if account_name.trim().is_empty() || container.trim().is_empty() {
                    return fail("azure storage needs account_name and container");
                }
            }
            StorageBackend::Filesystem { root } => {
                if root.as_os_str().is_empty() {
                    return fail("filesystem storage needs a root");
                }
            }
        }

        Ok(())
    }

    pub fn layout(&self) -> RemoteLayout {
        RemoteLayout::new(&self.product_name)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage.timeout_secs)
    }

    pub fn installer_timeout(&self) -> Duration {
        Duration::from_secs(self.installer.timeout_secs)
    }
}

/// Commented starting point written by `stagepush init`.
pub const SAMPLE_CONFIG: &str = r#"# stagepush publish configuration

product_name = "MyProduct"
staging_path = "bin/Release"
# staging file whose version becomes the product version
product_version_file = "MyProduct.exe"
# log entries kept for the changelog
retention = 50

[scan]
masks = ["*.exe", "*.dll"]
recursive = false
exclude = ["*.vshost.exe"]

[installer]
# process | zip_file | build_output_zip | third_party_tool
kind = "zip_file"
output = "dist/MyProduct.zip"
# integer exit code, or "ignore"
success_code = 0
timeout_secs = 0
# executable = "C:/Tools/packager.exe"
# arguments = "--out dist/MyProduct.msi"
# script_path = "installer/MyProduct.deploy"
# version_line = 6
# tool_args = ["/b", "/q"]

[storage]
timeout_secs = 60
# local_credential_path = "stagepush.credentials.toml"

[storage.backend]
type = "filesystem"
root = "publish"
# type = "azure"
# account_name = "myaccount"
# container = "releases"
"#;
