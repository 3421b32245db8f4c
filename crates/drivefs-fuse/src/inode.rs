//! Inode management for the FUSE filesystem.
//!
//! Inodes are keyed by remote record id, not by path: a hard-linked record
//! has one inode whichever folder it is reached through, and a record keeps
//! its inode across refreshes even when it is renamed or moved. Each inode
//! also remembers the last path it was reached by, which is what child
//! lookups are resolved against.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;

use drivefs_core::{RemoteFileRecord, ROOT_PATH};

/// Reserved inode for the root directory.
pub const ROOT_INO: u64 = 1;

/// Permission bits for every entry. The mount is read-only regardless.
pub const ENTRY_PERM: u16 = 0o744;

/// Inode attributes matching FUSE requirements.
#[derive(Debug, Clone, PartialEq)]
pub struct InodeAttr {
    /// Inode number.
    pub ino: u64,
    /// Size in bytes.
    pub size: u64,
    /// Number of blocks (512-byte blocks).
    pub blocks: u64,
    /// Access time.
    pub atime: SystemTime,
    /// Modification time.
    pub mtime: SystemTime,
    /// Change time.
    pub ctime: SystemTime,
    /// Creation time.
    pub crtime: SystemTime,
    /// File type.
    pub kind: InodeKind,
    /// Permission mode bits.
    pub perm: u16,
    /// Number of hard links.
    pub nlink: u32,
    /// Owner user ID.
    pub uid: u32,
    /// Owner group ID.
    pub gid: u32,
}

/// Type of inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    File,
    Directory,
}

impl InodeAttr {
    /// Attributes for `record`, owned by the mounting user.
    pub fn from_record(ino: u64, record: &RemoteFileRecord) -> Self {
        let (uid, gid) = current_owner();
        Self::from_record_as(ino, record, uid, gid)
    }

    /// Attributes for `record` with an explicit owner.
    pub fn from_record_as(ino: u64, record: &RemoteFileRecord, uid: u32, gid: u32) -> Self {
        let parents = record.parent_count() as u32;
        let (kind, nlink) = if record.is_folder() {
            (InodeKind::Directory, 1 + parents)
        } else {
            (InodeKind::File, parents.max(1))
        };
        let size = record.size_in_bytes();

        InodeAttr {
            ino,
            size,
            blocks: size.div_ceil(512),
            atime: SystemTime::from(record.access_time()),
            mtime: SystemTime::from(record.modify_time()),
            ctime: SystemTime::from(record.create_time()),
            crtime: SystemTime::from(record.create_time()),
            kind,
            perm: ENTRY_PERM,
            nlink,
            uid,
            gid,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory
    }

    /// Default TTL for attributes.
    pub fn ttl() -> Duration {
        Duration::from_secs(1)
    }
}

#[cfg(unix)]
fn current_owner() -> (u32, u32) {
    unsafe { (libc::getuid(), libc::getgid()) }
}

#[cfg(not(unix))]
fn current_owner() -> (u32, u32) {
    (0, 0)
}

#[derive(Debug, Clone)]
struct InodeEntry {
    id: String,
    path: String,
}

/// Inode table mapping inode numbers to record ids.
pub struct InodeTable {
    /// Record id to inode mapping.
    id_to_ino: RwLock<HashMap<String, u64>>,
    /// Inode to record id and last known path.
    entries: RwLock<HashMap<u64, InodeEntry>>,
    /// Next available inode number.
    next_ino: RwLock<u64>,
}

impl InodeTable {
    /// Create a new inode table with the root record at [`ROOT_INO`].
    pub fn new(root_id: &str) -> Self {
        let table = InodeTable {
            id_to_ino: RwLock::new(HashMap::new()),
            entries: RwLock::new(HashMap::new()),
            next_ino: RwLock::new(ROOT_INO + 1),
        };

        {
            let mut id_to_ino = table.id_to_ino.write();
            let mut entries = table.entries.write();
            id_to_ino.insert(root_id.to_string(), ROOT_INO);
            entries.insert(
                ROOT_INO,
                InodeEntry {
                    id: root_id.to_string(),
                    path: ROOT_PATH.to_string(),
                },
            );
        }

        table
    }

    /// Get or allocate the inode for `id`, recording `path` as the path it
    /// was last reached by.
    pub fn get_or_assign(&self, id: &str, path: &str) -> u64 {
        if let Some(&ino) = self.id_to_ino.read().get(id) {
            if ino != ROOT_INO {
                if let Some(entry) = self.entries.write().get_mut(&ino) {
                    if entry.path != path {
                        entry.path = path.to_string();
                    }
                }
            }
            return ino;
        }

        let mut id_to_ino = self.id_to_ino.write();
        // Another thread may have won the race
        if let Some(&ino) = id_to_ino.get(id) {
            return ino;
        }

        let ino = {
            let mut next = self.next_ino.write();
            let ino = *next;
            *next += 1;
            ino
        };
        id_to_ino.insert(id.to_string(), ino);
        self.entries.write().insert(
            ino,
            InodeEntry {
                id: id.to_string(),
                path: path.to_string(),
            },
        );
        ino
    }

    /// Record id for an inode.
    pub fn get_id(&self, ino: u64) -> Option<String> {
        self.entries.read().get(&ino).map(|e| e.id.clone())
    }

    /// Last path an inode was reached by.
    pub fn get_path(&self, ino: u64) -> Option<String> {
        self.entries.read().get(&ino).map(|e| e.path.clone())
    }

    /// Record id and last path together.
    pub fn get(&self, ino: u64) -> Option<(String, String)> {
        self.entries
            .read()
            .get(&ino)
            .map(|e| (e.id.clone(), e.path.clone()))
    }

    /// Inode for a record id, if one was assigned.
    pub fn get_ino(&self, id: &str) -> Option<u64> {
        self.id_to_ino.read().get(id).copied()
    }

    /// Replace the remembered path of an inode.
    pub fn set_path(&self, ino: u64, path: &str) {
        if let Some(entry) = self.entries.write().get_mut(&ino) {
            entry.path = path.to_string();
        }
    }

    /// Number of assigned inodes, the root included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
