//! Namespace integration tests
//!
//! Builds snapshots from raw listing JSON and random DAGs, then checks that
//! path resolution, listings, and change application agree with each other.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use drivefs_core::{
    escape_name, normalize_path, Change, CoreError, MetadataStore, RawFileResource,
    RemoteFileRecord, Snapshot, SnapshotCell,
};
use proptest::prelude::*;

const LISTING: &str = r#"[
  {"id": "a", "title": "Docs", "mimeType": "application/vnd.google-apps.folder",
   "parents": [{"id": "root"}], "modifiedDate": "2024-03-01T10:00:00.000Z"},
  {"id": "b", "title": "notes.txt", "mimeType": "text/plain", "fileSize": "120",
   "parents": [{"id": "a"}], "modifiedDate": "2024-03-02T11:30:00.000Z",
   "createdDate": "2024-03-02T11:00:00.000Z", "lastViewedByMeDate": "2024-03-05T09:00:00.000Z"},
  {"id": "c", "title": "Q1/Q2 plan", "mimeType": "text/plain", "fileSize": "7",
   "parents": [{"id": "a"}, {"id": "root"}]},
  {"id": "d", "title": "lost.txt", "mimeType": "text/plain", "fileSize": "1",
   "parents": [{"id": "gone"}]}
]"#;

fn listing_snapshot() -> Snapshot {
    let raw: Vec<RawFileResource> = serde_json::from_str(LISTING).unwrap();
    let mut store: MetadataStore = raw.into_iter().map(RemoteFileRecord::from_raw).collect();
    store.upsert(RemoteFileRecord::root("root"));
    Snapshot::build(store, Some("root")).unwrap()
}

#[test]
fn test_listing_resolves() {
    let snap = listing_snapshot();

    let notes = snap.lookup("/Docs/notes.txt").unwrap();
    assert_eq!(notes.size_in_bytes(), 120);
    assert!(!notes.is_folder());
    assert_eq!(notes.modify_time().to_rfc3339(), "2024-03-02T11:30:00+00:00");

    let docs = snap.lookup("/Docs").unwrap();
    assert!(docs.is_folder());
    assert_eq!(docs.size_in_bytes(), 4096);
}

#[test]
fn test_listing_hard_link_and_escaping() {
    let snap = listing_snapshot();
    let escaped = escape_name("Q1/Q2 plan");
    assert_eq!(escaped, "Q1%2FQ2 plan");

    let canonical = snap.canonical_path("c").unwrap().to_string();
    assert_eq!(canonical, format!("/{}", escaped));
    assert_eq!(snap.lookup(&canonical).unwrap().id(), "c");
    assert_eq!(snap.lookup(&format!("/Docs/{}", escaped)).unwrap().id(), "c");
}

#[test]
fn test_listing_orphan_hidden_but_stored() {
    let snap = listing_snapshot();
    assert_eq!(snap.get("d").unwrap().display_name(), "lost.txt");
    assert_eq!(snap.canonical_path("d"), None);
    assert_eq!(snap.summary().unreachable, 1);
    assert!(matches!(
        snap.lookup("/lost.txt"),
        Err(CoreError::NotFound(_))
    ));
}

#[test]
fn test_root_listing() {
    let snap = listing_snapshot();
    let names: Vec<String> = snap
        .list_children(snap.root())
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec!["Docs".to_string(), "Q1%2FQ2 plan".to_string()]);
}

#[test]
fn test_change_feed_sequence() {
    let snap = listing_snapshot().with_change_id(Some(100));

    let moved = snap
        .apply_changes(
            vec![
                Change::Upsert(RemoteFileRecord::file("b", "notes.txt", &["root"], 130)),
                Change::Upsert(RemoteFileRecord::folder("e", "Archive", &["a"])),
            ],
            Some(101),
        )
        .unwrap();
    assert_eq!(moved.lookup("/notes.txt").unwrap().size_in_bytes(), 130);
    assert!(moved.lookup("/Docs/Archive").unwrap().is_folder());

    let pruned = moved
        .apply_changes(vec![Change::Remove("a".to_string())], Some(102))
        .unwrap();
    assert!(pruned.lookup("/Docs").is_err());
    assert!(pruned.lookup("/Docs/Archive").is_err());
    // Still linked from the root
    assert_eq!(pruned.lookup("/Q1%2FQ2 plan").unwrap().id(), "c");
    assert_eq!(pruned.change_id(), Some(102));
}

#[test]
fn test_concurrent_readers_during_publish() {
    let cell = Arc::new(SnapshotCell::new(listing_snapshot()));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                for _ in 0..200 {
                    let snap = cell.load();
                    // Each snapshot is internally consistent: either both
                    // paths exist or the rename has fully landed.
                    let old = snap.lookup("/Docs/notes.txt").is_ok();
                    let new = snap.lookup("/renamed.txt").is_ok();
                    assert!(old ^ new);
                }
            })
        })
        .collect();

    for i in 0..20 {
        let current = cell.load();
        let change = if i % 2 == 0 {
            RemoteFileRecord::file("b", "renamed.txt", &["root"], 120)
        } else {
            RemoteFileRecord::file("b", "notes.txt", &["a"], 120)
        };
        let next = current.apply_changes(vec![Change::Upsert(change)], None).unwrap();
        cell.publish(next);
    }

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(cell.generation(), 20);
}

/// A random DAG: folders "f0".."fN", files "x0".."xM", parents drawn from
/// the root and earlier folders, plus a few arbitrary extra edges that may
/// form cycles.
fn arb_store() -> impl Strategy<Value = MetadataStore> {
    let names = prop::sample::select(vec!["a", "b", "c", "a/b", "%", "..", "."]);
    (
        prop::collection::vec((names.clone(), prop::collection::vec(any::<u8>(), 1..3)), 1..12),
        prop::collection::vec((names, prop::collection::vec(any::<u8>(), 0..3)), 0..20),
        prop::collection::vec((any::<u8>(), any::<u8>()), 0..4),
    )
        .prop_map(|(folders, files, extra)| {
            let mut store = MetadataStore::new();
            store.upsert(RemoteFileRecord::root("root"));

            let pick = |i: usize, seed: u8| -> String {
                let n = (seed as usize) % (i + 1);
                if n == 0 {
                    "root".to_string()
                } else {
                    format!("f{}", n - 1)
                }
            };

            let mut folder_parents: Vec<Vec<String>> = Vec::new();
            for (i, (name, seeds)) in folders.iter().enumerate() {
                let parents: Vec<String> = seeds.iter().map(|s| pick(i, *s)).collect();
                folder_parents.push(parents);
                let refs: Vec<&str> = folder_parents[i].iter().map(String::as_str).collect();
                store.upsert(RemoteFileRecord::folder(&format!("f{}", i), name, &refs));
            }
            for (from, to) in extra {
                let i = from as usize % folders.len();
                let mut parents = folder_parents[i].clone();
                parents.push(format!("f{}", to as usize % folders.len()));
                let refs: Vec<&str> = parents.iter().map(String::as_str).collect();
                store.upsert(RemoteFileRecord::folder(&format!("f{}", i), folders[i].0, &refs));
            }
            for (j, (name, seeds)) in files.iter().enumerate() {
                let parents: Vec<String> =
                    seeds.iter().map(|s| pick(folders.len(), *s)).collect();
                let refs: Vec<&str> = parents.iter().map(String::as_str).collect();
                store.upsert(RemoteFileRecord::file(&format!("x{}", j), name, &refs, j as u64));
            }
            store
        })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_canonical_paths_resolve_to_their_record(store in arb_store()) {
        let snap = Snapshot::build(store, Some("root")).unwrap();
        for record in snap.store().records() {
            if let Some(path) = snap.canonical_path(record.id()) {
                prop_assert_eq!(normalize_path(path).unwrap(), path.to_string());
                let found = snap.lookup(path).unwrap();
                prop_assert_eq!(found.id(), record.id());
            }
        }
    }

    #[test]
    fn prop_cached_paths_are_unique_and_consistent(store in arb_store()) {
        let snap = Snapshot::build(store, Some("root")).unwrap();
        let cached = snap.resolver().cached_paths();
        let canonical: BTreeSet<&str> = snap
            .store()
            .records()
            .filter_map(|r| snap.canonical_path(r.id()))
            .collect();
        for path in &canonical {
            prop_assert!(cached.contains_key(*path));
        }
        for (path, id) in &cached {
            let found = snap.lookup(path).unwrap();
            prop_assert_eq!(found.id(), id.as_str());
        }
        prop_assert_eq!(snap.summary().reachable, canonical.len());
    }

    #[test]
    fn prop_rebuild_is_deterministic(store in arb_store()) {
        let first = Snapshot::build(store.clone(), Some("root")).unwrap();
        let second = Snapshot::build(store, Some("root")).unwrap();
        prop_assert_eq!(first.resolver().cached_paths(), second.resolver().cached_paths());
    }

    #[test]
    fn prop_listing_names_resolve_under_parent(store in arb_store()) {
        let snap = Snapshot::build(store, Some("root")).unwrap();
        for record in snap.store().records() {
            let Some(dir) = snap.canonical_path(record.id()) else { continue };
            let mut seen = BTreeSet::new();
            for (name, child) in snap.list_children(record) {
                prop_assert!(!name.contains('/'));
                if !seen.insert(name.clone()) {
                    continue;
                }
                let path = if dir == "/" { format!("/{}", name) } else { format!("{}/{}", dir, name) };
                let resolved = snap.lookup(&path).unwrap();
                // The first sibling with a given name owns it
                prop_assert_eq!(resolved.id(), child.id());
            }
        }
    }
}
