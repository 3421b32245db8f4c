//! Immutable store + resolver pairs and the cell that publishes them.
//!
//! Readers take an `Arc<Snapshot>` and keep using it for as long as they
//! like. A refresh builds a new snapshot off to the side and swaps it in, so
//! nobody ever observes a half-applied change set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::record::RemoteFileRecord;
use crate::resolver::{NamespaceResolver, RebuildSummary};
use crate::store::MetadataStore;

/// A single incremental change.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Insert or replace this record.
    Upsert(RemoteFileRecord),
    /// Drop the record with this id.
    Remove(String),
}

/// A consistent, read-only view of the remote namespace.
#[derive(Debug)]
pub struct Snapshot {
    store: MetadataStore,
    resolver: NamespaceResolver,
    root: Arc<RemoteFileRecord>,
    change_id: Option<u64>,
    built_at: DateTime<Utc>,
    summary: RebuildSummary,
}

impl Snapshot {
    /// Build a snapshot from a populated store.
    ///
    /// With `root_id` the root must be present; without it the store must
    /// hold exactly one parentless record.
    pub fn build(store: MetadataStore, root_id: Option<&str>) -> Result<Self, CoreError> {
        let root = match root_id {
            Some(id) => store
                .get(id)
                .ok_or_else(|| CoreError::RootNotFound(id.to_string()))?,
            None => store.find_root()?,
        };

        let mut resolver = NamespaceResolver::new(root.id());
        let summary = resolver.rebuild(&store)?;

        Ok(Snapshot {
            store,
            resolver,
            root,
            change_id: None,
            built_at: Utc::now(),
            summary,
        })
    }

    /// An empty namespace holding only the root folder.
    pub fn empty(root_id: &str) -> Self {
        let root = Arc::new(RemoteFileRecord::root(root_id));
        let mut store = MetadataStore::new();
        store.upsert_shared(Arc::clone(&root));
        let mut resolver = NamespaceResolver::new(root_id);
        let summary = resolver.rebuild(&store).unwrap_or_default();

        Snapshot {
            store,
            resolver,
            root,
            change_id: None,
            built_at: Utc::now(),
            summary,
        }
    }

    /// Record the remote change id this snapshot is current as of.
    pub fn with_change_id(mut self, change_id: Option<u64>) -> Self {
        self.change_id = change_id;
        self
    }

    /// Apply a batch of changes to a copy of this snapshot.
    ///
    /// Removing the root is ignored; a changed root record keeps its role.
    pub fn apply_changes(
        &self,
        changes: Vec<Change>,
        change_id: Option<u64>,
    ) -> Result<Snapshot, CoreError> {
        let mut store = self.store.clone();
        let root_id = self.root.id();
        let mut upserts = 0usize;
        let mut removals = 0usize;

        for change in changes {
            match change {
                Change::Upsert(record) => {
                    store.upsert(record);
                    upserts += 1;
                }
                Change::Remove(id) if id == root_id => {
                    debug!(id = %id, "ignoring removal of the root");
                }
                Change::Remove(id) => {
                    if store.remove(&id).is_some() {
                        removals += 1;
                    }
                }
            }
        }

        let next = Snapshot::build(store, Some(root_id))?
            .with_change_id(change_id.or(self.change_id));
        debug!(upserts, removals, records = next.len(), "changes applied");
        Ok(next)
    }

    /// Resolve a path.
    pub fn lookup(&self, path: &str) -> Result<Arc<RemoteFileRecord>, CoreError> {
        self.resolver.lookup(&self.store, path)
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Result<Arc<RemoteFileRecord>, CoreError> {
        self.store
            .get(id)
            .ok_or_else(|| CoreError::UnknownId(id.to_string()))
    }

    /// Children of a record, with escaped names, in id order.
    pub fn list_children(&self, record: &RemoteFileRecord) -> Vec<(String, Arc<RemoteFileRecord>)> {
        self.resolver.list_children(&self.store, record)
    }

    pub fn canonical_path(&self, id: &str) -> Option<&str> {
        self.resolver.canonical_path(id)
    }

    pub fn root(&self) -> &Arc<RemoteFileRecord> {
        &self.root
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn resolver(&self) -> &NamespaceResolver {
        &self.resolver
    }

    /// Number of stored records, reachable or not.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn change_id(&self) -> Option<u64> {
        self.change_id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// What the last resolver rebuild found.
    pub fn summary(&self) -> &RebuildSummary {
        &self.summary
    }
}

/// Holds the current snapshot and swaps in new ones atomically.
pub struct SnapshotCell {
    current: RwLock<Arc<Snapshot>>,
    generation: AtomicU64,
}

impl SnapshotCell {
    pub fn new(initial: Snapshot) -> Self {
        SnapshotCell {
            current: RwLock::new(Arc::new(initial)),
            generation: AtomicU64::new(0),
        }
    }

    /// The current snapshot.
    pub fn load(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Replace the current snapshot. Readers holding the old one keep it.
    pub fn publish(&self, next: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(next);
        let previous = std::mem::replace(&mut *self.current.write(), Arc::clone(&next));
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(
            generation,
            records = next.len(),
            reachable = next.summary().reachable,
            change_id = ?next.change_id(),
            "snapshot published"
        );
        drop(previous);
        next
    }

    /// How many snapshots have been published since creation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for SnapshotCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCell")
            .field("generation", &self.generation())
            .field("records", &self.current.read().len())
            .finish()
    }
}
