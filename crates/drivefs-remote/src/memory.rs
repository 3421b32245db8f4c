//! In-memory remote account.
//!
//! Keeps a file table and a change feed, pages both like the real service,
//! and can be told to fail upcoming calls. Used by tests and by the CLI's
//! `--demo` mode.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use drivefs_core::{FileLabels, ParentReference, RawFileResource, FOLDER_MIME_TYPE};

use crate::client::{AccountInfo, ChangePage, ChangeRecord, FilePage, RemoteSyncClient};
use crate::error::SyncError;

const DEFAULT_MEMORY_PAGE_SIZE: usize = 100;

/// Per-method call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub about: u32,
    pub list_files: u32,
    pub list_changes: u32,
}

#[derive(Debug)]
struct MemoryState {
    files: BTreeMap<String, RawFileResource>,
    changes: Vec<ChangeRecord>,
    next_change_id: u64,
    /// Calls allowed to succeed before injected failures start.
    fail_after: u32,
    failures: u32,
    fail_status: u16,
    calls: CallCounts,
}

/// An in-memory [`RemoteSyncClient`].
#[derive(Debug)]
pub struct MemoryRemote {
    root_id: String,
    page_size: usize,
    include_trashed: bool,
    state: Mutex<MemoryState>,
}

impl MemoryRemote {
    /// An empty account whose root folder has id `root_id`.
    pub fn new(root_id: impl Into<String>) -> Self {
        MemoryRemote {
            root_id: root_id.into(),
            page_size: DEFAULT_MEMORY_PAGE_SIZE,
            include_trashed: false,
            state: Mutex::new(MemoryState {
                files: BTreeMap::new(),
                changes: Vec::new(),
                next_change_id: 1,
                fail_after: 0,
                failures: 0,
                fail_status: 503,
                calls: CallCounts::default(),
            }),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_include_trashed(mut self, include_trashed: bool) -> Self {
        self.include_trashed = include_trashed;
        self
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Insert or replace a file and append it to the change feed.
    pub fn put(&self, file: RawFileResource) -> u64 {
        let mut state = self.state.lock();
        let change_id = state.next_change_id;
        state.next_change_id += 1;
        state.changes.push(ChangeRecord {
            change_id,
            file_id: file.id.clone(),
            deleted: false,
            file: Some(file.clone()),
        });
        state.files.insert(file.id.clone(), file);
        change_id
    }

    pub fn put_folder(&self, id: &str, title: &str, parents: &[&str]) -> u64 {
        self.put(RawFileResource {
            id: id.to_string(),
            title: Some(title.to_string()),
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
            parents: parents.iter().map(|p| ParentReference::new(*p)).collect(),
            ..Default::default()
        })
    }

    pub fn put_file(&self, id: &str, title: &str, parents: &[&str], size: u64) -> u64 {
        self.put(RawFileResource {
            id: id.to_string(),
            title: Some(title.to_string()),
            mime_type: Some("text/plain".to_string()),
            file_size: Some(size),
            parents: parents.iter().map(|p| ParentReference::new(*p)).collect(),
            ..Default::default()
        })
    }

    /// Permanently delete a file. Returns false if it did not exist.
    pub fn delete(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        if state.files.remove(id).is_none() {
            return false;
        }
        let change_id = state.next_change_id;
        state.next_change_id += 1;
        state.changes.push(ChangeRecord {
            change_id,
            file_id: id.to_string(),
            deleted: true,
            file: None,
        });
        true
    }

    /// Move a file to the trash. Returns false if it did not exist.
    pub fn trash(&self, id: &str) -> bool {
        let trashed = {
            let state = self.state.lock();
            state.files.get(id).cloned()
        };
        match trashed {
            Some(mut file) => {
                file.labels = Some(FileLabels { trashed: true });
                self.put(file);
                true
            }
            None => false,
        }
    }

    /// Let the next `ok_calls` calls succeed, then fail `failures` calls
    /// with `status`.
    pub fn fail_after(&self, ok_calls: u32, failures: u32, status: u16) {
        let mut state = self.state.lock();
        state.fail_after = ok_calls;
        state.failures = failures;
        state.fail_status = status;
    }

    /// Fail the next `failures` calls with 503.
    pub fn fail_next(&self, failures: u32) {
        self.fail_after(0, failures, 503);
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    pub fn largest_change_id(&self) -> u64 {
        self.state.lock().next_change_id - 1
    }

    fn check_failure(state: &mut MemoryState) -> Result<(), SyncError> {
        if state.failures == 0 {
            return Ok(());
        }
        if state.fail_after > 0 {
            state.fail_after -= 1;
            return Ok(());
        }
        state.failures -= 1;
        Err(SyncError::Status {
            status: state.fail_status,
            body: "injected failure".to_string(),
        })
    }
}

fn parse_offset(page_token: Option<&str>) -> Result<usize, SyncError> {
    match page_token {
        None => Ok(0),
        Some(token) => token
            .parse()
            .map_err(|_| SyncError::Status {
                status: 400,
                body: format!("invalid page token {:?}", token),
            }),
    }
}

fn next_token(offset: usize, taken: usize, total: usize) -> Option<String> {
    let next = offset + taken;
    (next < total).then(|| next.to_string())
}

#[async_trait]
impl RemoteSyncClient for MemoryRemote {
    async fn about(&self) -> Result<AccountInfo, SyncError> {
        let mut state = self.state.lock();
        state.calls.about += 1;
        Self::check_failure(&mut state)?;
        Ok(AccountInfo {
            root_folder_id: self.root_id.clone(),
            largest_change_id: Some(state.next_change_id - 1),
        })
    }

    async fn list_files(&self, page_token: Option<&str>) -> Result<FilePage, SyncError> {
        let mut state = self.state.lock();
        state.calls.list_files += 1;
        Self::check_failure(&mut state)?;

        let offset = parse_offset(page_token)?;
        let visible: Vec<&RawFileResource> = state
            .files
            .values()
            .filter(|f| self.include_trashed || !f.is_trashed())
            .collect();
        let items: Vec<RawFileResource> = visible
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|f| (*f).clone())
            .collect();
        let next_page_token = next_token(offset, items.len(), visible.len());

        Ok(FilePage {
            items,
            next_page_token,
        })
    }

    async fn list_changes(
        &self,
        start_change_id: u64,
        page_token: Option<&str>,
    ) -> Result<ChangePage, SyncError> {
        let mut state = self.state.lock();
        state.calls.list_changes += 1;
        Self::check_failure(&mut state)?;

        let offset = parse_offset(page_token)?;
        let pending: Vec<&ChangeRecord> = state
            .changes
            .iter()
            .filter(|c| c.change_id >= start_change_id)
            .collect();
        let items: Vec<ChangeRecord> = pending
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|c| (*c).clone())
            .collect();
        let next_page_token = next_token(offset, items.len(), pending.len());

        Ok(ChangePage {
            items,
            next_page_token,
            largest_change_id: Some(state.next_change_id - 1),
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}
