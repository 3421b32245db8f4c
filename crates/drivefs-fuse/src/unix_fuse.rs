//! Unix FUSE implementation using the `fuser` crate.

use std::ffi::OsStr;
use std::time::SystemTime;

use fuser::{
    FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use tracing::{debug, error};

use crate::common::{inode_attr_to_file_attr, DriveFsCore, FsOpError};
use crate::inode::InodeKind;

/// Unix FUSE filesystem wrapper around `DriveFsCore`.
pub struct UnixFuse(pub DriveFsCore);

impl UnixFuse {
    pub(crate) fn error_to_errno(e: &FsOpError) -> i32 {
        match e {
            FsOpError::NotFound => libc::ENOENT,
            FsOpError::NotDir => libc::ENOTDIR,
            FsOpError::ReadOnly => libc::EROFS,
            FsOpError::InvalidArg => libc::EINVAL,
            FsOpError::NotSupported => libc::ENOSYS,
            FsOpError::Io(_) => libc::EIO,
        }
    }
}

/// Decode a name from the kernel, replying `EINVAL` if it is not UTF-8.
macro_rules! name_or_einval {
    ($name:expr, $reply:expr) => {
        match $name.to_str() {
            Some(n) => n,
            None => {
                $reply.error(libc::EINVAL);
                return;
            }
        }
    };
}

impl Filesystem for UnixFuse {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name_str = name_or_einval!(name, reply);
        debug!("lookup: parent={}, name={}", parent, name_str);

        match self.0.do_lookup(parent, name_str) {
            Ok(attr) => {
                let file_attr = inode_attr_to_file_attr(&attr);
                reply.entry(&self.0.attr_ttl(), &file_attr, 0);
            }
            Err(e) => {
                debug!("lookup failed: {:?}", Self::error_to_errno(&e));
                reply.error(Self::error_to_errno(&e));
            }
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        debug!("getattr: ino={}", ino);

        match self.0.do_getattr(ino) {
            Ok(attr) => {
                let file_attr = inode_attr_to_file_attr(&attr);
                reply.attr(&self.0.attr_ttl(), &file_attr);
            }
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        debug!("open: ino={}", ino);

        match self.0.do_open(ino) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read: ino={}, offset={}, size={}", ino, offset, size);

        match self.0.do_read(ino, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!("write: ino={}, offset={}, len={}", ino, offset, data.len());

        match self.0.do_write(ino) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        debug!("opendir: ino={}", ino);

        match self.0.do_opendir(ino) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir: ino={}, offset={}", ino, offset);

        match self.0.do_readdir(ino) {
            Ok(result) => {
                let mut i = offset as usize;

                if i == 0 {
                    if reply.add(result.ino, 1, FileType::Directory, ".") {
                        reply.ok();
                        return;
                    }
                    i += 1;
                }
                if i == 1 {
                    if reply.add(result.parent_ino, 2, FileType::Directory, "..") {
                        reply.ok();
                        return;
                    }
                    i += 1;
                }

                let skip = i.saturating_sub(2);
                for entry in result.entries.into_iter().skip(skip) {
                    let ft = match entry.kind {
                        InodeKind::File => FileType::RegularFile,
                        InodeKind::Directory => FileType::Directory,
                    };
                    i += 1;
                    if reply.add(entry.ino, i as i64, ft, &entry.name) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(e) => {
                debug!("readdir failed: {:?}", Self::error_to_errno(&e));
                reply.error(Self::error_to_errno(&e));
            }
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let name_str = name_or_einval!(name, reply);
        debug!("create: parent={}, name={}", parent, name_str);

        match self.0.do_create(parent, name_str) {
            Ok(attr) => {
                let file_attr = inode_attr_to_file_attr(&attr);
                reply.created(&self.0.attr_ttl(), &file_attr, 0, 0, 0);
            }
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let name_str = name_or_einval!(name, reply);
        debug!("mkdir: parent={}, name={}", parent, name_str);

        match self.0.do_mkdir(parent, name_str) {
            Ok(attr) => {
                let file_attr = inode_attr_to_file_attr(&attr);
                reply.entry(&self.0.attr_ttl(), &file_attr, 0);
            }
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name_str = name_or_einval!(name, reply);
        debug!("unlink: parent={}, name={}", parent, name_str);

        match self.0.do_unlink(parent, name_str) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name_str = name_or_einval!(name, reply);
        debug!("rmdir: parent={}, name={}", parent, name_str);

        match self.0.do_rmdir(parent, name_str) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!("setattr: ino={}, size={:?}", ino, size);

        match self.0.do_setattr(ino) {
            Ok(attr) => {
                let file_attr = inode_attr_to_file_attr(&attr);
                reply.attr(&self.0.attr_ttl(), &file_attr);
            }
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let name_str = name_or_einval!(name, reply);
        let newname_str = name_or_einval!(newname, reply);

        debug!(
            "rename: parent={}, name={}, newparent={}, newname={}",
            parent, name_str, newparent, newname_str
        );

        match self.0.do_rename(parent, name_str, newparent, newname_str) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        let files = self.0.record_count();
        reply.statfs(0, 0, 0, files, 0, 4096, 255, 4096);
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        if mask & libc::W_OK != 0 {
            reply.error(libc::EROFS);
            return;
        }
        match self.0.do_access(ino) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn destroy(&mut self) {
        if let Err(e) = self.0.shutdown() {
            error!("failed to stop background sync: {:?}", e);
        }
    }
}
