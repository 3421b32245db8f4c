//! Read-only FUSE filesystem over a drivefs namespace snapshot.
//!
//! Directory listings and attributes are answered from the snapshot the sync
//! engine last published. Content reads report `ENOSYS` and every mutation
//! reports `EROFS`.
//!
//! # Architecture
//!
//! - `common`: `DriveFsCore` with all snapshot interaction logic
//! - `inode`: id-keyed inode table and POSIX attributes
//! - `unix_fuse`: `fuser::Filesystem` impl for macOS/Linux
//!
//! # Example
//!
//! ```ignore
//! use drivefs_fuse::DriveFs;
//!
//! let fs = DriveFs::from_config_file(Path::new("drivefs.yaml"))?;
//! fs.mount(Path::new("/mnt/drive"))?;
//! ```

mod async_bridge;
mod common;
mod inode;
#[cfg(unix)]
mod unix_fuse;

pub use async_bridge::{block_on, FuseError};
pub use common::{DirEntry, DriveFsCore, FsOpError, ReadDirResult};
pub use inode::{InodeAttr, InodeKind, InodeTable, ENTRY_PERM, ROOT_INO};
#[cfg(unix)]
pub use unix_fuse::UnixFuse;

/// The mountable filesystem type.
pub type DriveFs = DriveFsCore;
