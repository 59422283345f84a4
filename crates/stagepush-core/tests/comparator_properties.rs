//! Exhaustive checks of the publish decision over small version sets.
//!
//! Every combination of three filenames, each absent or at one of three
//! versions, is tried on both sides.

use stagepush_core::{
    compare, DecisionReason, FileVersion, FileVersionEntry, Provenance, VersionSet,
};

const NAMES: [&str; 3] = ["a.exe", "b.dll", "c.dll"];
const VERSIONS: [FileVersion; 3] = [
    FileVersion::new(1, 0, 0, 0),
    FileVersion::new(1, 0, 0, 1),
    FileVersion::new(2, 0, 0, 0),
];

/// Each filename is absent (None) or carries one of `VERSIONS`.
fn all_sets(provenance: Provenance) -> Vec<VersionSet> {
    let choices: Vec<Option<FileVersion>> = std::iter::once(None)
        .chain(VERSIONS.iter().copied().map(Some))
        .collect();
    let mut sets = Vec::new();
    for a in &choices {
        for b in &choices {
            for c in &choices {
                let entries = NAMES
                    .iter()
                    .zip([a, b, c])
                    .filter_map(|(name, v)| v.map(|v| FileVersionEntry::new(*name, v)));
                sets.push(VersionSet::try_from_entries(provenance, entries).unwrap());
            }
        }
    }
    sets
}

#[test]
fn no_publish_iff_shared_files_equal_and_nothing_new() {
    let remotes = all_sets(Provenance::Remote);
    for local in all_sets(Provenance::Local).iter().filter(|s| !s.is_empty()) {
        for remote in &remotes {
            let decision = compare(local, remote);
            let expected_quiet = !remote.is_empty()
                && local.iter().all(|entry| match remote.get(entry.filename()) {
                    Some(published) => entry.version() <= published.version(),
                    None => false,
                });
            let unchanged_shared = local.iter().all(|entry| {
                remote
                    .get(entry.filename())
                    .map_or(true, |published| entry.version() <= published.version())
            });
            let nothing_new = local.iter().all(|entry| remote.contains(entry.filename()));

            assert_eq!(
                !decision.should_publish,
                expected_quiet,
                "local={:?} remote={:?}",
                local.pairs(),
                remote.pairs()
            );
            assert_eq!(
                !decision.should_publish,
                unchanged_shared && nothing_new && !remote.is_empty()
            );
        }
    }
}

#[test]
fn empty_remote_always_publishes_everything() {
    let empty = VersionSet::empty(Provenance::Remote);
    for local in all_sets(Provenance::Local).iter().filter(|s| !s.is_empty()) {
        let decision = compare(local, &empty);
        assert!(decision.should_publish);
        assert_eq!(decision.reason, DecisionReason::NoRemoteManifest);
        assert!(decision.changed_files.same_entries(local));
    }
}

#[test]
fn changed_files_are_a_subset_of_local_and_never_removed_files() {
    let remotes = all_sets(Provenance::Remote);
    for local in all_sets(Provenance::Local).iter().filter(|s| !s.is_empty()) {
        for remote in &remotes {
            let decision = compare(local, remote);
            for changed in decision.changed_files.iter() {
                let local_entry = local.get(changed.filename()).unwrap();
                assert_eq!(local_entry.version(), changed.version());
            }
            match decision.reason {
                DecisionReason::VersionIncreased => {
                    for changed in decision.changed_files.iter() {
                        let published = remote.get(changed.filename()).unwrap();
                        assert!(changed.version() > published.version());
                    }
                }
                DecisionReason::NewFilesAdded => {
                    for changed in decision.changed_files.iter() {
                        assert!(!remote.contains(changed.filename()));
                    }
                }
                DecisionReason::NoChange => assert!(decision.changed_files.is_empty()),
                DecisionReason::NoRemoteManifest => assert!(remote.is_empty()),
            }
        }
    }
}

#[test]
fn version_order_is_total_and_component_wise() {
    let versions = [
        FileVersion::parse("1.1.9.9").unwrap(),
        FileVersion::parse("1.2.0.0").unwrap(),
        FileVersion::parse("2.0.0.0").unwrap(),
        FileVersion::parse("2.0").unwrap(),
        FileVersion::parse_lenient("garbage"),
    ];
    assert!(versions[1] > versions[0]);
    assert_eq!(versions[2], versions[3]);
    for v in &versions[..4] {
        assert!(*v > versions[4]);
    }
    let mut sorted = versions.to_vec();
    sorted.sort();
    assert_eq!(sorted[0], FileVersion::ZERO);
    assert_eq!(sorted[4], FileVersion::new(2, 0, 0, 0));
}
