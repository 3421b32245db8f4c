//! Platform-neutral filesystem logic.
//!
//! Every call loads the current snapshot once and answers from it, so a
//! refresh published mid-call never mixes two versions of the namespace.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use drivefs_config::{DriveFsConfig, MountConfig};
use drivefs_core::path::{join_path, parent_path};
use drivefs_core::{CoreError, RemoteFileRecord, Snapshot, SnapshotCell};
use drivefs_remote::{DriveClient, SyncEngine, SyncSettings, TokenStore};
use tracing::{info, warn};

use crate::async_bridge::block_on;
use crate::inode::{InodeAttr, InodeKind, InodeTable, ROOT_INO};

/// Errors returned by filesystem operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOpError {
    /// File or directory not found.
    NotFound,
    /// Listing or descending into something that is not a folder.
    NotDir,
    /// Any mutation; the mount is read-only.
    ReadOnly,
    /// Invalid argument (e.g., bad filename encoding).
    InvalidArg,
    /// Content access, which this filesystem does not provide.
    NotSupported,
    /// Generic I/O error.
    Io(String),
}

impl From<crate::async_bridge::FuseError> for FsOpError {
    fn from(e: crate::async_bridge::FuseError) -> Self {
        FsOpError::Io(e.to_string())
    }
}

impl From<CoreError> for FsOpError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidPath(_) => FsOpError::InvalidArg,
            e if e.is_not_found() => FsOpError::NotFound,
            e => FsOpError::Io(e.to_string()),
        }
    }
}

/// Core filesystem logic, platform-independent.
pub struct DriveFsCore {
    /// Background sync, when this core owns one.
    engine: Option<Arc<SyncEngine>>,
    /// Where the current snapshot is loaded from.
    cell: Arc<SnapshotCell>,
    /// Inode management.
    pub inodes: Arc<InodeTable>,
    attr_ttl: Duration,
    fs_name: String,
    allow_other: bool,
}

impl DriveFsCore {
    /// Create a new core from a config file.
    pub fn from_config_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let config = DriveFsConfig::from_file(path)?;
        Self::from_config(config)
    }

    /// Create a core that loads the configured account and keeps it in sync.
    ///
    /// Blocks until the first full listing has been fetched. The background
    /// poll task runs on the bridge runtime.
    pub fn from_config(config: DriveFsConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let config = config.effective();
        config.validate_or_err()?;

        let credentials = PathBuf::from(
            config
                .account
                .credentials_file
                .clone()
                .unwrap_or_default(),
        );
        let engine = block_on(async {
            let tokens = TokenStore::load(
                credentials,
                config.account.client_id.clone(),
                config.account.client_secret.clone(),
            )
            .await?;
            let client = DriveClient::from_config(&config, Arc::new(tokens))?;
            let engine =
                SyncEngine::initial_load(Arc::new(client), SyncSettings::from(&config.sync))
                    .await?;
            engine.start().await;
            Ok::<_, drivefs_remote::SyncError>(engine)
        })??;

        Ok(Self::from_engine(Arc::new(engine), &config.mount))
    }

    /// Wrap an already loaded engine.
    pub fn from_engine(engine: Arc<SyncEngine>, mount: &MountConfig) -> Self {
        let cell = engine.cell();
        let root_id = cell.load().root().id().to_string();
        DriveFsCore {
            engine: Some(engine),
            cell,
            inodes: Arc::new(InodeTable::new(&root_id)),
            attr_ttl: mount.attr_ttl(),
            fs_name: mount.fs_name().to_string(),
            allow_other: mount.allow_other,
        }
    }

    /// Serve a fixed snapshot with no background sync.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self::from_cell(Arc::new(SnapshotCell::new(snapshot)))
    }

    /// Serve whatever gets published into `cell`.
    pub fn from_cell(cell: Arc<SnapshotCell>) -> Self {
        let root_id = cell.load().root().id().to_string();
        let mount = MountConfig::default();
        DriveFsCore {
            engine: None,
            cell,
            inodes: Arc::new(InodeTable::new(&root_id)),
            attr_ttl: mount.attr_ttl(),
            fs_name: mount.fs_name().to_string(),
            allow_other: false,
        }
    }

    pub fn cell(&self) -> Arc<SnapshotCell> {
        Arc::clone(&self.cell)
    }

    pub fn engine(&self) -> Option<&Arc<SyncEngine>> {
        self.engine.as_ref()
    }

    /// TTL handed to the kernel for entries and attributes.
    pub fn attr_ttl(&self) -> Duration {
        self.attr_ttl
    }

    /// Get the last known path for an inode.
    pub fn get_path(&self, ino: u64) -> Option<String> {
        self.inodes.get_path(ino)
    }

    /// Record behind an inode in `snapshot`, with a usable path for it.
    ///
    /// The remembered path is replaced by the canonical one when it no
    /// longer leads to the same record (the record was moved or renamed).
    fn resolve_ino(
        &self,
        snapshot: &Snapshot,
        ino: u64,
    ) -> Result<(Arc<RemoteFileRecord>, String), FsOpError> {
        let (id, path) = self.inodes.get(ino).ok_or(FsOpError::NotFound)?;
        let record = snapshot.get(&id)?;

        let still_valid = snapshot
            .lookup(&path)
            .map(|found| found.id() == id)
            .unwrap_or(false);
        if still_valid {
            return Ok((record, path));
        }

        let canonical = snapshot
            .canonical_path(&id)
            .ok_or(FsOpError::NotFound)?
            .to_string();
        self.inodes.set_path(ino, &canonical);
        Ok((record, canonical))
    }

    fn attr_for(&self, record: &RemoteFileRecord, path: &str) -> InodeAttr {
        let ino = self.inodes.get_or_assign(record.id(), path);
        InodeAttr::from_record(ino, record)
    }

    /// Perform a lookup operation.
    pub fn do_lookup(&self, parent: u64, name: &str) -> Result<InodeAttr, FsOpError> {
        if name.is_empty() || name.contains('/') || name.contains('\0') {
            return Err(FsOpError::InvalidArg);
        }

        let snapshot = self.cell.load();
        let (parent_record, parent_path) = self.resolve_ino(&snapshot, parent)?;
        if !parent_record.is_folder() {
            return Err(FsOpError::NotDir);
        }

        let child_path = join_path(&parent_path, name);
        match snapshot.lookup(&child_path) {
            Ok(record) if record.has_parent(parent_record.id()) => {
                Ok(self.attr_for(&record, &child_path))
            }
            Ok(_) | Err(_) => {
                // The path walk can land elsewhere when the parent was only
                // reachable by an alias; scan the parent directly.
                let (_, record) = snapshot
                    .list_children(&parent_record)
                    .into_iter()
                    .find(|(escaped, _)| escaped == name)
                    .ok_or(FsOpError::NotFound)?;
                Ok(self.attr_for(&record, &child_path))
            }
        }
    }

    /// Perform a getattr operation.
    pub fn do_getattr(&self, ino: u64) -> Result<InodeAttr, FsOpError> {
        let snapshot = self.cell.load();
        let (id, _) = self.inodes.get(ino).ok_or(FsOpError::NotFound)?;
        let record = snapshot.get(&id)?;
        Ok(InodeAttr::from_record(ino, &record))
    }

    /// Perform a readdir operation.
    pub fn do_readdir(&self, ino: u64) -> Result<ReadDirResult, FsOpError> {
        let snapshot = self.cell.load();
        let (record, path) = self.resolve_ino(&snapshot, ino)?;
        if !record.is_folder() {
            return Err(FsOpError::NotDir);
        }

        let parent_ino = if ino == ROOT_INO {
            ROOT_INO
        } else {
            let up = parent_path(&path);
            snapshot
                .lookup(up)
                .map(|parent| self.inodes.get_or_assign(parent.id(), up))
                .unwrap_or(ROOT_INO)
        };

        let mut seen = std::collections::HashSet::new();
        let mut entries = Vec::new();
        for (name, child) in snapshot.list_children(&record) {
            // Two siblings with the same name: the first one owns the entry
            if !seen.insert(name.clone()) {
                warn!(dir = %path, name = %name, id = child.id(), "duplicate entry hidden");
                continue;
            }
            let child_path = join_path(&path, &name);
            entries.push(DirEntry {
                ino: self.inodes.get_or_assign(child.id(), &child_path),
                kind: if child.is_folder() {
                    InodeKind::Directory
                } else {
                    InodeKind::File
                },
                name,
            });
        }

        Ok(ReadDirResult {
            ino,
            parent_ino,
            entries,
            is_root: ino == ROOT_INO,
        })
    }

    /// Check that an inode exists in the current snapshot.
    pub fn do_access(&self, ino: u64) -> Result<(), FsOpError> {
        let snapshot = self.cell.load();
        let (id, _) = self.inodes.get(ino).ok_or(FsOpError::NotFound)?;
        snapshot.get(&id)?;
        Ok(())
    }

    /// Open a directory.
    pub fn do_opendir(&self, ino: u64) -> Result<(), FsOpError> {
        let attr = self.do_getattr(ino)?;
        if !attr.is_dir() {
            return Err(FsOpError::NotDir);
        }
        Ok(())
    }

    /// File contents are not served.
    pub fn do_open(&self, ino: u64) -> Result<(), FsOpError> {
        self.do_access(ino)?;
        Err(FsOpError::NotSupported)
    }

    /// File contents are not served.
    pub fn do_read(&self, ino: u64, _offset: i64, _size: u32) -> Result<Vec<u8>, FsOpError> {
        self.do_access(ino)?;
        Err(FsOpError::NotSupported)
    }

    pub fn do_write(&self, _ino: u64) -> Result<u32, FsOpError> {
        Err(FsOpError::ReadOnly)
    }

    pub fn do_create(&self, _parent: u64, _name: &str) -> Result<InodeAttr, FsOpError> {
        Err(FsOpError::ReadOnly)
    }

    pub fn do_mkdir(&self, _parent: u64, _name: &str) -> Result<InodeAttr, FsOpError> {
        Err(FsOpError::ReadOnly)
    }

    pub fn do_unlink(&self, _parent: u64, _name: &str) -> Result<(), FsOpError> {
        Err(FsOpError::ReadOnly)
    }

    pub fn do_rmdir(&self, _parent: u64, _name: &str) -> Result<(), FsOpError> {
        Err(FsOpError::ReadOnly)
    }

    pub fn do_rename(
        &self,
        _parent: u64,
        _name: &str,
        _newparent: u64,
        _newname: &str,
    ) -> Result<(), FsOpError> {
        Err(FsOpError::ReadOnly)
    }

    pub fn do_setattr(&self, _ino: u64) -> Result<InodeAttr, FsOpError> {
        Err(FsOpError::ReadOnly)
    }

    /// Record count of the current snapshot, for statfs.
    pub fn record_count(&self) -> u64 {
        self.cell.load().len() as u64
    }

    /// Stop the background sync, if any. Must not be called from inside an
    /// async context.
    pub fn shutdown(&self) -> Result<(), FsOpError> {
        if let Some(engine) = &self.engine {
            stop_engine(engine)?;
        }
        Ok(())
    }

    /// Mount the filesystem read-only. Blocks until it is unmounted.
    #[cfg(unix)]
    pub fn mount(self, mountpoint: &Path) -> Result<(), Box<dyn std::error::Error>> {
        use crate::unix_fuse::UnixFuse;

        let options = self.mount_options();
        let engine = self.engine.clone();

        info!(
            mountpoint = %mountpoint.display(),
            fs_name = %self.fs_name,
            records = self.record_count(),
            "mounting drivefs"
        );
        fuser::mount2(UnixFuse(self), mountpoint, &options)?;
        info!("drivefs unmounted");

        if let Some(engine) = engine {
            stop_engine(&engine).map_err(|e| format!("{e:?}"))?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn mount_options(&self) -> Vec<fuser::MountOption> {
        use fuser::MountOption;

        let mut options = vec![
            MountOption::FSName(self.fs_name.clone()),
            MountOption::RO,
            MountOption::AutoUnmount,
        ];
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        options
    }
}

fn stop_engine(engine: &SyncEngine) -> Result<(), FsOpError> {
    block_on(engine.shutdown())?;
    Ok(())
}

/// Result from a readdir operation.
pub struct ReadDirResult {
    /// Inode of the directory being listed.
    pub ino: u64,
    /// Inode of the parent directory.
    pub parent_ino: u64,
    /// Entries in the directory, `.` and `..` excluded.
    pub entries: Vec<DirEntry>,
    /// Whether this is the root directory.
    pub is_root: bool,
}

/// A single directory entry.
pub struct DirEntry {
    /// Inode number.
    pub ino: u64,
    /// Escaped entry name.
    pub name: String,
    /// Entry kind.
    pub kind: InodeKind,
}

/// Convert an `InodeAttr` to a `fuser::FileAttr`.
#[cfg(unix)]
pub fn inode_attr_to_file_attr(attr: &InodeAttr) -> fuser::FileAttr {
    use fuser::{FileAttr, FileType};

    let kind = match attr.kind {
        InodeKind::File => FileType::RegularFile,
        InodeKind::Directory => FileType::Directory,
    };

    FileAttr {
        ino: attr.ino,
        size: attr.size,
        blocks: attr.blocks,
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.crtime,
        kind,
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}
