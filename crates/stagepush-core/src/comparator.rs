//! Comparator: decides whether the local build warrants a publish.
//!
//! Rules are applied in strict priority order:
//! 1. remote empty → publish everything (`NoRemoteManifest`)
//! 2. any shared file with a higher local version → `VersionIncreased`
//! 3. any local file unknown remotely → `NewFilesAdded`
//! 4. otherwise → `NoChange`
//!
//! Files present remotely but gone locally are ignored.

use std::fmt;

use serde::Serialize;

use crate::domain::{Provenance, VersionSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    NoRemoteManifest,
    VersionIncreased,
    NewFilesAdded,
    NoChange,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionReason::NoRemoteManifest => "no_remote_manifest",
            DecisionReason::VersionIncreased => "version_increased",
            DecisionReason::NewFilesAdded => "new_files_added",
            DecisionReason::NoChange => "no_change",
        };
        f.write_str(s)
    }
}

/// Outcome of one comparison. Produced fresh each cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishDecision {
    pub should_publish: bool,
    pub reason: DecisionReason,
    pub changed_files: VersionSet,
    pub explanation: String,
}

impl PublishDecision {
    fn no_change(explanation: &str) -> Self {
        Self {
            should_publish: false,
            reason: DecisionReason::NoChange,
            changed_files: VersionSet::empty(Provenance::Local),
            explanation: explanation.to_string(),
        }
    }
}

fn describe(header: &str, files: &VersionSet, with_versions: bool) -> String {
    let names: Vec<String> = files
        .iter()
        .map(|e| {
            if with_versions {
                format!("{} = {}", e.filename(), e.version())
            } else {
                e.filename().to_string()
            }
        })
        .collect();
    format!("{header}: {}", names.join(", "))
}

/// Compare a local scan against the published manifest.
pub fn compare(local: &VersionSet, remote: &VersionSet) -> PublishDecision {
    if local.is_empty() {
        return PublishDecision::no_change("No versioned files found locally.");
    }

    if remote.is_empty() {
        return PublishDecision {
            should_publish: true,
            reason: DecisionReason::NoRemoteManifest,
            changed_files: local.clone(),
            explanation: "No remote version info found, installer will be uploaded.".to_string(),
        };
    }

    let increased = local.subset(|entry| {
        remote
            .get(entry.filename())
            .is_some_and(|published| entry.ordering_version() > published.ordering_version())
    });
    if !increased.is_empty() {
        return PublishDecision {
            should_publish: true,
            reason: DecisionReason::VersionIncreased,
            explanation: describe("New file versions found", &increased, true),
            changed_files: increased,
        };
    }

    let added = local.subset(|entry| !remote.contains(entry.filename()));
    if !added.is_empty() {
        return PublishDecision {
            should_publish: true,
            reason: DecisionReason::NewFilesAdded,
            explanation: describe("New files added to project", &added, false),
            changed_files: added,
        };
    }

    PublishDecision::no_change("No new version to upload.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FileVersion, FileVersionEntry};

    fn set(provenance: Provenance, pairs: &[(&str, &str)]) -> VersionSet {
        VersionSet::try_from_entries(
            provenance,
            pairs
                .iter()
                .map(|(n, v)| FileVersionEntry::new(*n, FileVersion::parse_lenient(v))),
        )
        .unwrap()
    }

    #[test]
    fn test_first_publish() {
        let local = set(Provenance::Local, &[("a.exe", "1.0.0.0"), ("b.dll", "1.0.0.0")]);
        let decision = compare(&local, &VersionSet::empty(Provenance::Remote));
        assert!(decision.should_publish);
        assert_eq!(decision.reason, DecisionReason::NoRemoteManifest);
        assert!(decision.changed_files.same_entries(&local));
    }

    #[test]
    fn test_version_increase_only_reports_increased_files() {
        let local = set(Provenance::Local, &[("a.exe", "1.0.1.0"), ("b.dll", "1.0.0.0")]);
        let remote = set(Provenance::Remote, &[("a.exe", "1.0.0.0"), ("b.dll", "1.0.0.0")]);
        let decision = compare(&local, &remote);
        assert_eq!(decision.reason, DecisionReason::VersionIncreased);
        assert_eq!(
            decision.changed_files.pairs(),
            vec![("a.exe".to_string(), FileVersion::new(1, 0, 1, 0))]
        );
        assert_eq!(decision.explanation, "New file versions found: a.exe = 1.0.1.0");
    }

    #[test]
    fn test_increase_wins_over_added_files() {
        let local = set(Provenance::Local, &[("a.exe", "2.0"), ("c.dll", "1.0")]);
        let remote = set(Provenance::Remote, &[("a.exe", "1.0")]);
        let decision = compare(&local, &remote);
        assert_eq!(decision.reason, DecisionReason::VersionIncreased);
        assert!(!decision.changed_files.contains("c.dll"));
    }

    #[test]
    fn test_new_files_added() {
        let local = set(
            Provenance::Local,
            &[("a.exe", "1.0"), ("b.dll", "1.0"), ("c.dll", "0.1")],
        );
        let remote = set(Provenance::Remote, &[("a.exe", "1.0"), ("b.dll", "1.0")]);
        let decision = compare(&local, &remote);
        assert_eq!(decision.reason, DecisionReason::NewFilesAdded);
        assert_eq!(decision.changed_files.len(), 1);
        assert!(decision.changed_files.contains("c.dll"));
        assert_eq!(decision.explanation, "New files added to project: c.dll");
    }

    #[test]
    fn test_downgrade_and_removal_do_not_publish() {
        let local = set(Provenance::Local, &[("a.exe", "1.0")]);
        let remote = set(Provenance::Remote, &[("a.exe", "2.0"), ("gone.dll", "1.0")]);
        let decision = compare(&local, &remote);
        assert!(!decision.should_publish);
        assert_eq!(decision.reason, DecisionReason::NoChange);
        assert!(decision.changed_files.is_empty());
    }

    #[test]
    fn test_join_is_case_insensitive() {
        let local = set(Provenance::Local, &[("App.EXE", "1.0")]);
        let remote = set(Provenance::Remote, &[("app.exe", "1.0")]);
        assert_eq!(compare(&local, &remote).reason, DecisionReason::NoChange);
    }

    #[test]
    fn test_malformed_remote_version_is_below_zero() {
        let local = set(Provenance::Local, &[("a.exe", "0.0.0.0")]);
        let remote = VersionSet::try_from_entries(
            Provenance::Remote,
            [FileVersionEntry::unparsed("a.exe")],
        )
        .unwrap();
        let decision = compare(&local, &remote);
        assert_eq!(decision.reason, DecisionReason::VersionIncreased);
        assert!(decision.changed_files.contains("a.exe"));
    }

    #[test]
    fn test_malformed_remote_version_is_lowest() {
        let local = set(Provenance::Local, &[("a.exe", "0.0.0.1")]);
        let remote = set(Provenance::Remote, &[("a.exe", "corrupt")]);
        assert_eq!(compare(&local, &remote).reason, DecisionReason::VersionIncreased);
    }

    #[test]
    fn test_empty_local_never_publishes() {
        let decision = compare(
            &VersionSet::empty(Provenance::Local),
            &VersionSet::empty(Provenance::Remote),
        );
        assert!(!decision.should_publish);
        assert_eq!(decision.reason, DecisionReason::NoChange);
    }
}
