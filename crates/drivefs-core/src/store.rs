use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::CoreError;
use crate::record::RemoteFileRecord;

/// Every known remote record, indexed by id, with a parent→children index.
///
/// Cloning is cheap relative to a fetch: records are shared, only the maps
/// are copied. Refreshes clone the live store, modify the copy, and publish it.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    records: HashMap<String, Arc<RemoteFileRecord>>,
    /// Parent id -> child ids. Parents need not be present (orphan edges).
    children: HashMap<String, BTreeSet<String>>,
}

impl MetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        MetadataStore::default()
    }

    /// Insert or replace a record, returning the previous version.
    pub fn upsert(&mut self, record: RemoteFileRecord) -> Option<Arc<RemoteFileRecord>> {
        self.upsert_shared(Arc::new(record))
    }

    /// Insert or replace an already shared record.
    pub fn upsert_shared(&mut self, record: Arc<RemoteFileRecord>) -> Option<Arc<RemoteFileRecord>> {
        let id = record.id().to_string();
        let previous = self.records.insert(id.clone(), Arc::clone(&record));

        if let Some(ref old) = previous {
            self.unlink_parents(&id, old.parent_ids());
        }
        for parent in record.parent_ids() {
            self.children
                .entry(parent.clone())
                .or_default()
                .insert(id.clone());
        }

        previous
    }

    /// Remove a record by id. Its own children stay in the store and become
    /// orphans unless they have other parents.
    pub fn remove(&mut self, id: &str) -> Option<Arc<RemoteFileRecord>> {
        let removed = self.records.remove(id)?;
        self.unlink_parents(id, removed.parent_ids());
        Some(removed)
    }

    fn unlink_parents(&mut self, id: &str, parents: &[String]) {
        for parent in parents {
            if let Some(set) = self.children.get_mut(parent) {
                set.remove(id);
                if set.is_empty() {
                    self.children.remove(parent);
                }
            }
        }
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Option<Arc<RemoteFileRecord>> {
        self.records.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Iterate the children of `id` in id order.
    pub fn children(&self, id: &str) -> impl Iterator<Item = &Arc<RemoteFileRecord>> + '_ {
        self.children
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(move |child_id| self.records.get(child_id))
    }

    /// Every record listing `id` among its parents, each once, in id order.
    pub fn children_of(&self, id: &str) -> Vec<Arc<RemoteFileRecord>> {
        self.children(id).cloned().collect()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate all records in no particular order.
    pub fn records(&self) -> impl Iterator<Item = &Arc<RemoteFileRecord>> + '_ {
        self.records.values()
    }

    /// The unique parentless record.
    pub fn find_root(&self) -> Result<Arc<RemoteFileRecord>, CoreError> {
        let mut roots: Vec<&Arc<RemoteFileRecord>> = self
            .records
            .values()
            .filter(|r| r.parent_count() == 0)
            .collect();

        match roots.len() {
            0 => Err(CoreError::NoRoot),
            1 => Ok(Arc::clone(roots[0])),
            _ => {
                roots.sort_by(|a, b| a.id().cmp(b.id()));
                Err(CoreError::MultipleRoots(
                    roots.iter().map(|r| r.id().to_string()).collect(),
                ))
            }
        }
    }
}

impl FromIterator<RemoteFileRecord> for MetadataStore {
    fn from_iter<I: IntoIterator<Item = RemoteFileRecord>>(iter: I) -> Self {
        let mut store = MetadataStore::new();
        for record in iter {
            store.upsert(record);
        }
        store
    }
}
