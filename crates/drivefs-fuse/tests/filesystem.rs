#![cfg(unix)]
//! Integration tests for drivefs-fuse.
//!
//! These drive `DriveFsCore` the way the kernel would, against snapshots
//! published by a real `SyncEngine` over the in-memory remote.

use std::sync::Arc;
use std::thread;
use std::time::SystemTime;

use drivefs_config::MountConfig;
use drivefs_core::{
    parse_timestamp, MetadataStore, ParentReference, RawFileResource, RemoteFileRecord, Snapshot,
};
use drivefs_fuse::{DriveFsCore, FsOpError, InodeKind, ROOT_INO};
use drivefs_remote::{MemoryRemote, SyncEngine, SyncSettings};

// ============== Test Helpers ==============

fn sample_remote() -> Arc<MemoryRemote> {
    let remote = MemoryRemote::new("root");
    remote.put_folder("a", "Docs", &["root"]);
    remote.put_file("b", "notes.txt", &["a"], 1500);
    remote.put_file("c", "Q1/Q2 plan", &["root", "a"], 7);
    remote.put_folder("e", "Archive", &["a"]);
    Arc::new(remote)
}

async fn core_over(remote: Arc<MemoryRemote>) -> (Arc<SyncEngine>, DriveFsCore) {
    let engine = Arc::new(
        SyncEngine::initial_load(remote, SyncSettings::default())
            .await
            .unwrap(),
    );
    let core = DriveFsCore::from_engine(Arc::clone(&engine), &MountConfig::default());
    (engine, core)
}

fn names(core: &DriveFsCore, ino: u64) -> Vec<String> {
    core.do_readdir(ino)
        .unwrap()
        .entries
        .into_iter()
        .map(|e| e.name)
        .collect()
}

// ============== Attributes ==============

#[tokio::test]
async fn test_attributes_follow_records() {
    let (_engine, core) = core_over(sample_remote()).await;

    let root = core.do_getattr(ROOT_INO).unwrap();
    assert_eq!(root.kind, InodeKind::Directory);
    assert_eq!(root.nlink, 1);

    let docs = core.do_lookup(ROOT_INO, "Docs").unwrap();
    assert_eq!(docs.kind, InodeKind::Directory);
    assert_eq!(docs.size, 4096);
    assert_eq!(docs.nlink, 2);
    assert_eq!(docs.perm, 0o744);

    let notes = core.do_lookup(docs.ino, "notes.txt").unwrap();
    assert_eq!(notes.kind, InodeKind::File);
    assert_eq!(notes.size, 1500);
    assert_eq!(notes.blocks, 3);
    assert_eq!(notes.nlink, 1);
}

#[tokio::test]
async fn test_ctime_is_create_date() {
    let remote = sample_remote();
    remote.put(RawFileResource {
        id: "r".to_string(),
        title: Some("report.pdf".to_string()),
        file_size: Some(10),
        parents: vec![ParentReference::new("root")],
        created_date: Some("2010-03-04T05:06:07.000Z".to_string()),
        modified_date: Some("2020-08-09T10:11:12.000Z".to_string()),
        ..Default::default()
    });
    let (_engine, core) = core_over(remote).await;

    let created = SystemTime::from(parse_timestamp("2010-03-04T05:06:07.000Z").unwrap());
    let modified = SystemTime::from(parse_timestamp("2020-08-09T10:11:12.000Z").unwrap());
    let report = core.do_lookup(ROOT_INO, "report.pdf").unwrap();
    assert_eq!(report.ctime, created);
    assert_eq!(report.crtime, created);
    assert_eq!(report.mtime, modified);
}

#[tokio::test]
async fn test_uid_gid_of_running_process() {
    let (_engine, core) = core_over(sample_remote()).await;
    let attr = core.do_getattr(ROOT_INO).unwrap();
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    assert_eq!((attr.uid, attr.gid), (uid, gid));
}

// ============== Directory Listing ==============

#[tokio::test]
async fn test_readdir_lists_escaped_names() {
    let (_engine, core) = core_over(sample_remote()).await;
    assert_eq!(names(&core, ROOT_INO), vec!["Docs", "Q1%2FQ2 plan"]);

    let docs = core.do_lookup(ROOT_INO, "Docs").unwrap();
    assert_eq!(names(&core, docs.ino), vec!["notes.txt", "Q1%2FQ2 plan", "Archive"]);

    let listing = core.do_readdir(docs.ino).unwrap();
    assert_eq!(listing.parent_ino, ROOT_INO);
    assert!(!listing.is_root);
}

#[tokio::test]
async fn test_readdir_nested_parent_inode() {
    let (_engine, core) = core_over(sample_remote()).await;
    let docs = core.do_lookup(ROOT_INO, "Docs").unwrap();
    let archive = core.do_lookup(docs.ino, "Archive").unwrap();
    let listing = core.do_readdir(archive.ino).unwrap();
    assert!(listing.entries.is_empty());
    assert_eq!(listing.parent_ino, docs.ino);
}

#[tokio::test]
async fn test_readdir_on_file_is_not_dir() {
    let (_engine, core) = core_over(sample_remote()).await;
    let plan = core.do_lookup(ROOT_INO, "Q1%2FQ2 plan").unwrap();
    assert!(matches!(core.do_readdir(plan.ino), Err(FsOpError::NotDir)));
    assert_eq!(core.do_opendir(plan.ino), Err(FsOpError::NotDir));
}

#[test]
fn test_duplicate_names_first_wins() {
    let mut store = MetadataStore::new();
    store.upsert(RemoteFileRecord::root("root"));
    store.upsert(RemoteFileRecord::file("x1", "same.txt", &["root"], 1));
    store.upsert(RemoteFileRecord::file("x2", "same.txt", &["root"], 2));
    let core = DriveFsCore::from_snapshot(Snapshot::build(store, Some("root")).unwrap());

    assert_eq!(names(&core, ROOT_INO), vec!["same.txt"]);
    assert_eq!(core.do_lookup(ROOT_INO, "same.txt").unwrap().size, 1);
}

// ============== Refresh Behavior ==============

#[tokio::test]
async fn test_inodes_stable_across_refreshes() {
    let remote = sample_remote();
    let (engine, core) = core_over(Arc::clone(&remote)).await;

    let docs = core.do_lookup(ROOT_INO, "Docs").unwrap();
    let notes = core.do_lookup(docs.ino, "notes.txt").unwrap();

    // Rename and move the file, then pick up the change
    remote.put_file("b", "renamed.txt", &["root"], 1500);
    engine.poll_changes().await.unwrap();

    assert_eq!(core.do_lookup(docs.ino, "notes.txt"), Err(FsOpError::NotFound));
    let moved = core.do_lookup(ROOT_INO, "renamed.txt").unwrap();
    assert_eq!(moved.ino, notes.ino);
    assert_eq!(core.get_path(notes.ino), Some("/renamed.txt".to_string()));

    engine.full_refresh().await.unwrap();
    assert_eq!(core.do_getattr(notes.ino).unwrap().ino, notes.ino);
}

#[tokio::test]
async fn test_deleted_record_disappears() {
    let remote = sample_remote();
    let (engine, core) = core_over(Arc::clone(&remote)).await;

    let docs = core.do_lookup(ROOT_INO, "Docs").unwrap();
    let notes = core.do_lookup(docs.ino, "notes.txt").unwrap();

    remote.delete("b");
    engine.poll_changes().await.unwrap();

    assert_eq!(core.do_getattr(notes.ino), Err(FsOpError::NotFound));
    assert!(!names(&core, docs.ino).contains(&"notes.txt".to_string()));
}

#[tokio::test]
async fn test_stale_parent_path_is_repaired() {
    let remote = sample_remote();
    let (engine, core) = core_over(Arc::clone(&remote)).await;

    let docs = core.do_lookup(ROOT_INO, "Docs").unwrap();
    remote.put_folder("a", "Documents", &["root"]);
    engine.poll_changes().await.unwrap();

    // The kernel still holds the old inode for the folder
    let notes = core.do_lookup(docs.ino, "notes.txt").unwrap();
    assert_eq!(notes.size, 1500);
    assert_eq!(core.get_path(docs.ino), Some("/Documents".to_string()));
}

#[tokio::test]
async fn test_failed_refresh_keeps_serving() {
    let remote = sample_remote();
    let (engine, core) = core_over(Arc::clone(&remote)).await;

    remote.fail_next(1);
    assert!(engine.full_refresh().await.is_err());
    assert_eq!(names(&core, ROOT_INO), vec!["Docs", "Q1%2FQ2 plan"]);
}

// ============== Concurrency ==============

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_lookups_during_refresh() {
    let remote = sample_remote();
    let (engine, core) = core_over(Arc::clone(&remote)).await;
    let core = Arc::new(core);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let core = Arc::clone(&core);
            thread::spawn(move || {
                for _ in 0..200 {
                    let docs = core.do_lookup(ROOT_INO, "Docs").unwrap();
                    let listing = core.do_readdir(docs.ino).unwrap();
                    assert!(listing.entries.len() >= 3);
                }
            })
        })
        .collect();

    for i in 0..20 {
        remote.put_file(&format!("n{}", i), &format!("new-{}.txt", i), &["a"], i);
        engine.poll_changes().await.unwrap();
    }

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(names(&core, core.do_lookup(ROOT_INO, "Docs").unwrap().ino).len(), 23);
}
