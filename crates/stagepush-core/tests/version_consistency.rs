//! Every workspace member inherits the workspace version, and the internal
//! entries in `[workspace.dependencies]` pin that same version.

use std::path::{Path, PathBuf};

const MEMBERS: [&str; 4] = [
    "blobstate",
    "stagepush-core",
    "stagepush-build",
    "stagepush-cli",
];

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap()
        .to_path_buf()
}

fn read_toml(path: &Path) -> toml::Value {
    let text = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    text.parse().unwrap()
}

fn workspace_version() -> String {
    let doc = read_toml(&workspace_root().join("Cargo.toml"));
    doc["workspace"]["package"]["version"]
        .as_str()
        .unwrap()
        .to_string()
}

#[test]
fn members_inherit_workspace_version() {
    for member in MEMBERS {
        let manifest = workspace_root().join("crates").join(member).join("Cargo.toml");
        let doc = read_toml(&manifest);
        let inherits = doc["package"]["version"]
            .get("workspace")
            .and_then(toml::Value::as_bool)
            == Some(true);
        assert!(inherits, "{member} should use version.workspace = true");
    }
}

#[test]
fn internal_dependencies_pin_workspace_version() {
    let doc = read_toml(&workspace_root().join("Cargo.toml"));
    let deps = &doc["workspace"]["dependencies"];
    let expected = workspace_version();

    for member in MEMBERS.iter().filter(|m| **m != "stagepush-cli") {
        let entry = deps
            .get(*member)
            .unwrap_or_else(|| panic!("{member} missing from [workspace.dependencies]"));
        assert_eq!(
            entry.get("version").and_then(toml::Value::as_str),
            Some(expected.as_str()),
            "{member} dependency version drifted from the workspace"
        );
        assert_eq!(
            entry.get("path").and_then(toml::Value::as_str),
            Some(format!("crates/{member}").as_str())
        );
    }
}

#[test]
fn workspace_version_matches_cargo_pkg() {
    assert_eq!(workspace_version(), env!("CARGO_PKG_VERSION"));
}
