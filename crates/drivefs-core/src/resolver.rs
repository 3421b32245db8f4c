//! Namespace resolution: from a DAG of records to filesystem paths.
//!
//! The remote side lets one object sit in several folders at once. A
//! filesystem wants one path per object, so [`NamespaceResolver::rebuild`]
//! walks the DAG breadth-first from the root and gives every reachable record
//! one canonical path: the first one reached, with siblings visited in id
//! order. Paths through the other parents are indexed too (alias entries), but
//! only the canonical copy of a folder is descended into, which keeps the
//! walk linear in the number of edges and safe against cycles.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::error::CoreError;
use crate::path::{join_path, normalize_path, split_path, ROOT_PATH};
use crate::record::RemoteFileRecord;
use crate::store::MetadataStore;

/// Resolver statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Lookups answered straight from the path cache.
    pub hits: u64,
    /// Lookups that needed the segment-by-segment walk.
    pub misses: u64,
    /// Misses that resolved and were written back into the cache.
    pub healed: u64,
    /// Sibling name collisions seen by the last rebuild.
    pub collisions: u64,
    /// Paths currently cached.
    pub cached_paths: usize,
}

impl ResolverStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Outcome of one rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Records with a canonical path, the root included.
    pub reachable: usize,
    /// Extra paths indexed for records with several parents.
    pub aliases: usize,
    /// Sibling paths dropped because another record already owned them.
    pub collisions: usize,
    /// Stored records not reachable from the root.
    pub unreachable: usize,
}

struct StatsTracker {
    hits: AtomicU64,
    misses: AtomicU64,
    healed: AtomicU64,
    collisions: AtomicU64,
}

impl StatsTracker {
    fn new() -> Self {
        StatsTracker {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            healed: AtomicU64::new(0),
            collisions: AtomicU64::new(0),
        }
    }
}

/// Canonical path assignment and path→record lookup for one store.
pub struct NamespaceResolver {
    root_id: String,
    /// Normalized path -> record id. Written by rebuild and by lookup misses.
    path_cache: RwLock<HashMap<String, String>>,
    /// Record id -> canonical path.
    canonical: HashMap<String, String>,
    stats: StatsTracker,
}

impl NamespaceResolver {
    /// Create a resolver rooted at `root_id`. Only `/` is known until
    /// [`rebuild`](Self::rebuild) runs.
    pub fn new(root_id: impl Into<String>) -> Self {
        let root_id = root_id.into();
        let mut path_cache = HashMap::new();
        path_cache.insert(ROOT_PATH.to_string(), root_id.clone());
        let mut canonical = HashMap::new();
        canonical.insert(root_id.clone(), ROOT_PATH.to_string());

        NamespaceResolver {
            root_id,
            path_cache: RwLock::new(path_cache),
            canonical,
            stats: StatsTracker::new(),
        }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Recompute every canonical path from scratch.
    pub fn rebuild(&mut self, store: &MetadataStore) -> Result<RebuildSummary, CoreError> {
        let root = store
            .get(&self.root_id)
            .ok_or_else(|| CoreError::RootNotFound(self.root_id.clone()))?;

        let mut paths: HashMap<String, String> = HashMap::with_capacity(store.len());
        let mut canonical: HashMap<String, String> = HashMap::with_capacity(store.len());
        let mut summary = RebuildSummary::default();

        paths.insert(ROOT_PATH.to_string(), root.id().to_string());
        canonical.insert(root.id().to_string(), ROOT_PATH.to_string());

        let mut queue: VecDeque<(String, String)> = VecDeque::new();
        queue.push_back((root.id().to_string(), ROOT_PATH.to_string()));

        while let Some((dir_id, dir_path)) = queue.pop_front() {
            for child in store.children(&dir_id) {
                let child_path = join_path(&dir_path, child.escaped_name());

                if let Some(owner) = paths.get(&child_path) {
                    if owner != child.id() {
                        summary.collisions += 1;
                        warn!(
                            path = %child_path,
                            kept = %owner,
                            dropped = %child.id(),
                            "duplicate path, keeping the first record"
                        );
                    }
                    continue;
                }
                paths.insert(child_path.clone(), child.id().to_string());

                if canonical.contains_key(child.id()) {
                    summary.aliases += 1;
                    trace!(path = %child_path, id = %child.id(), "alias path");
                    continue;
                }
                canonical.insert(child.id().to_string(), child_path.clone());

                if child.is_folder() {
                    queue.push_back((child.id().to_string(), child_path));
                }
            }
        }

        summary.reachable = canonical.len();
        summary.unreachable = store.len().saturating_sub(canonical.len());

        debug!(
            reachable = summary.reachable,
            aliases = summary.aliases,
            collisions = summary.collisions,
            unreachable = summary.unreachable,
            "namespace rebuilt"
        );

        *self.path_cache.get_mut() = paths;
        self.canonical = canonical;
        self.stats
            .collisions
            .store(summary.collisions as u64, Ordering::Relaxed);

        Ok(summary)
    }

    /// Resolve a path to its record.
    ///
    /// A cache miss falls back to walking the store one segment at a time
    /// and caches the result when the walk succeeds.
    pub fn lookup(
        &self,
        store: &MetadataStore,
        path: &str,
    ) -> Result<Arc<RemoteFileRecord>, CoreError> {
        let normalized = normalize_path(path)?;

        let cached = self.path_cache.read().get(&normalized).cloned();
        if let Some(id) = cached {
            if let Some(record) = store.get(&id) {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(record);
            }
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let record = self.walk(store, &normalized)?;
        self.path_cache
            .write()
            .insert(normalized.clone(), record.id().to_string());
        self.stats.healed.fetch_add(1, Ordering::Relaxed);
        debug!(path = %normalized, id = %record.id(), "resolved by walk");

        Ok(record)
    }

    fn walk(
        &self,
        store: &MetadataStore,
        normalized: &str,
    ) -> Result<Arc<RemoteFileRecord>, CoreError> {
        let not_found = || CoreError::NotFound(normalized.to_string());

        let mut current = store.get(&self.root_id).ok_or_else(not_found)?;
        for segment in split_path(normalized) {
            if !current.is_folder() {
                return Err(not_found());
            }
            let next = store
                .children(current.id())
                .find(|child| child.escaped_name() == segment)
                .cloned()
                .ok_or_else(not_found)?;
            current = next;
        }
        Ok(current)
    }

    /// Children of `record` paired with their escaped names, in id order.
    pub fn list_children(
        &self,
        store: &MetadataStore,
        record: &RemoteFileRecord,
    ) -> Vec<(String, Arc<RemoteFileRecord>)> {
        store
            .children(record.id())
            .map(|child| (child.escaped_name().to_string(), Arc::clone(child)))
            .collect()
    }

    /// The canonical path assigned to `id` by the last rebuild.
    pub fn canonical_path(&self, id: &str) -> Option<&str> {
        self.canonical.get(id).map(String::as_str)
    }

    /// Number of records with a canonical path.
    pub fn reachable(&self) -> usize {
        self.canonical.len()
    }

    /// A sorted copy of the path cache.
    pub fn cached_paths(&self) -> BTreeMap<String, String> {
        self.path_cache
            .read()
            .iter()
            .map(|(path, id)| (path.clone(), id.clone()))
            .collect()
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            healed: self.stats.healed.load(Ordering::Relaxed),
            collisions: self.stats.collisions.load(Ordering::Relaxed),
            cached_paths: self.path_cache.read().len(),
        }
    }
}

impl std::fmt::Debug for NamespaceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceResolver")
            .field("root_id", &self.root_id)
            .field("reachable", &self.canonical.len())
            .field("cached_paths", &self.path_cache.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> MetadataStore {
        [
            RemoteFileRecord::root("root"),
            RemoteFileRecord::folder("a", "Docs", &["root"]),
            RemoteFileRecord::file("b", "notes.txt", &["a"], 120),
        ]
        .into_iter()
        .collect()
    }

    fn built(store: &MetadataStore) -> NamespaceResolver {
        let mut resolver = NamespaceResolver::new("root");
        resolver.rebuild(store).unwrap();
        resolver
    }

    #[test]
    fn test_scenario_lookups() {
        let store = scenario();
        let resolver = built(&store);

        assert_eq!(resolver.lookup(&store, "/").unwrap().id(), "root");
        assert_eq!(resolver.lookup(&store, "/Docs").unwrap().id(), "a");
        let notes = resolver.lookup(&store, "/Docs/notes.txt").unwrap();
        assert_eq!(notes.id(), "b");
        assert_eq!(notes.size_in_bytes(), 120);
        assert_eq!(
            resolver.lookup(&store, "/missing"),
            Err(CoreError::NotFound("/missing".to_string()))
        );
    }

    #[test]
    fn test_list_children_of_root() {
        let store = scenario();
        let resolver = built(&store);
        let root = store.get("root").unwrap();

        let listing = resolver.list_children(&store, &root);
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].0, "Docs");
        assert_eq!(listing[0].1.id(), "a");
    }

    #[test]
    fn test_lookup_normalizes() {
        let store = scenario();
        let resolver = built(&store);
        assert_eq!(resolver.lookup(&store, "/Docs/").unwrap().id(), "a");
        assert_eq!(resolver.lookup(&store, "//Docs/./notes.txt").unwrap().id(), "b");
        assert_eq!(resolver.lookup(&store, "").unwrap().id(), "root");
    }

    #[test]
    fn test_lookup_rejects_malformed() {
        let store = scenario();
        let resolver = built(&store);
        assert!(matches!(
            resolver.lookup(&store, "/Docs\0"),
            Err(CoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_rebuild_requires_root() {
        let store = scenario();
        let mut resolver = NamespaceResolver::new("nope");
        assert_eq!(
            resolver.rebuild(&store),
            Err(CoreError::RootNotFound("nope".to_string()))
        );
    }

    #[test]
    fn test_hard_link_canonical_and_alias() {
        let mut store = scenario();
        store.upsert(RemoteFileRecord::file("c", "shared.txt", &["a", "root"], 9));
        let resolver = built(&store);

        // BFS reaches "c" from the root before descending into "Docs"
        assert_eq!(resolver.canonical_path("c"), Some("/shared.txt"));
        assert_eq!(resolver.lookup(&store, "/shared.txt").unwrap().id(), "c");
        assert_eq!(resolver.lookup(&store, "/Docs/shared.txt").unwrap().id(), "c");
        assert_eq!(resolver.stats().misses, 0);
    }

    #[test]
    fn test_hard_linked_folder_descended_once() {
        let store: MetadataStore = [
            RemoteFileRecord::root("root"),
            RemoteFileRecord::folder("a", "A", &["root"]),
            RemoteFileRecord::folder("b", "B", &["root"]),
            RemoteFileRecord::folder("s", "Shared", &["a", "b"]),
            RemoteFileRecord::file("f", "deep.txt", &["s"], 1),
        ]
        .into_iter()
        .collect();
        let mut resolver = NamespaceResolver::new("root");
        let summary = resolver.rebuild(&store).unwrap();

        assert_eq!(summary.reachable, 5);
        assert_eq!(summary.aliases, 1);
        assert_eq!(resolver.canonical_path("s"), Some("/A/Shared"));
        assert_eq!(resolver.canonical_path("f"), Some("/A/Shared/deep.txt"));

        // Not pre-indexed, but the walk still finds it and heals the cache
        assert!(!resolver.cached_paths().contains_key("/B/Shared/deep.txt"));
        assert_eq!(resolver.lookup(&store, "/B/Shared/deep.txt").unwrap().id(), "f");
        assert_eq!(
            resolver.cached_paths().get("/B/Shared/deep.txt").map(String::as_str),
            Some("f")
        );
        assert_eq!(resolver.stats().healed, 1);
    }

    #[test]
    fn test_sibling_collision_first_id_wins() {
        let store: MetadataStore = [
            RemoteFileRecord::root("root"),
            RemoteFileRecord::file("x2", "same.txt", &["root"], 2),
            RemoteFileRecord::file("x1", "same.txt", &["root"], 1),
        ]
        .into_iter()
        .collect();
        let mut resolver = NamespaceResolver::new("root");
        let summary = resolver.rebuild(&store).unwrap();

        assert_eq!(summary.collisions, 1);
        assert_eq!(resolver.lookup(&store, "/same.txt").unwrap().id(), "x1");
        assert_eq!(resolver.canonical_path("x2"), None);
        assert!(store.get("x2").is_some());
        assert_eq!(resolver.stats().collisions, 1);
    }

    #[test]
    fn test_orphans_excluded() {
        let mut store = scenario();
        store.upsert(RemoteFileRecord::file("o", "orphan.txt", &["ghost"], 1));
        let mut resolver = NamespaceResolver::new("root");
        let summary = resolver.rebuild(&store).unwrap();

        assert_eq!(summary.unreachable, 1);
        assert_eq!(resolver.canonical_path("o"), None);
        assert!(resolver.lookup(&store, "/orphan.txt").is_err());
        assert!(resolver.lookup(&store, "/ghost/orphan.txt").is_err());
    }

    #[test]
    fn test_child_of_file_unreachable() {
        let mut store = scenario();
        store.upsert(RemoteFileRecord::file("x", "attachment", &["b"], 1));
        let mut resolver = NamespaceResolver::new("root");
        let summary = resolver.rebuild(&store).unwrap();

        assert_eq!(summary.unreachable, 1);
        assert_eq!(
            resolver.lookup(&store, "/Docs/notes.txt/attachment"),
            Err(CoreError::NotFound("/Docs/notes.txt/attachment".to_string()))
        );
        assert!(!resolver
            .cached_paths()
            .contains_key("/Docs/notes.txt/attachment"));
    }

    #[test]
    fn test_cycle_terminates() {
        let store: MetadataStore = [
            RemoteFileRecord::root("root"),
            RemoteFileRecord::folder("a", "A", &["root", "b"]),
            RemoteFileRecord::folder("b", "B", &["a"]),
        ]
        .into_iter()
        .collect();
        let mut resolver = NamespaceResolver::new("root");
        let summary = resolver.rebuild(&store).unwrap();

        assert_eq!(summary.reachable, 3);
        assert_eq!(resolver.canonical_path("b"), Some("/A/B"));
        assert_eq!(resolver.lookup(&store, "/A/B/A").unwrap().id(), "a");
    }

    #[test]
    fn test_rebuild_idempotent() {
        let mut store = scenario();
        store.upsert(RemoteFileRecord::file("c", "shared.txt", &["a", "root"], 9));
        let mut resolver = NamespaceResolver::new("root");

        resolver.rebuild(&store).unwrap();
        let first = resolver.cached_paths();
        resolver.rebuild(&store).unwrap();
        assert_eq!(first, resolver.cached_paths());
    }

    #[test]
    fn test_rebuild_drops_healed_entries() {
        let store: MetadataStore = [
            RemoteFileRecord::root("root"),
            RemoteFileRecord::folder("a", "A", &["root"]),
            RemoteFileRecord::folder("b", "B", &["root"]),
            RemoteFileRecord::folder("s", "Shared", &["a", "b"]),
            RemoteFileRecord::file("f", "deep.txt", &["s"], 1),
        ]
        .into_iter()
        .collect();
        let mut resolver = built(&store);
        let indexed = resolver.cached_paths().len();
        resolver.lookup(&store, "/B/Shared/deep.txt").unwrap();
        assert_eq!(resolver.cached_paths().len(), indexed + 1);

        resolver.rebuild(&store).unwrap();
        assert_eq!(resolver.cached_paths().len(), indexed);
    }

    #[test]
    fn test_escaped_name_resolves_via_walk() {
        let mut store = scenario();
        store.upsert(RemoteFileRecord::file("s", "Q1/Q2 plan", &["a"], 3));
        let resolver = NamespaceResolver::new("root");

        // No rebuild: everything but "/" goes through the walk
        assert_eq!(resolver.lookup(&store, "/Docs/Q1%2FQ2 plan").unwrap().id(), "s");
        assert!(resolver.lookup(&store, "/Docs/Q1/Q2 plan").is_err());
    }

    #[test]
    fn test_stale_cache_entry_falls_back() {
        let mut store = scenario();
        let resolver = built(&store);
        store.remove("b");

        assert!(resolver.lookup(&store, "/Docs/notes.txt").is_err());
        assert_eq!(resolver.stats().misses, 1);
    }

    #[test]
    fn test_stats_hit_rate() {
        let store = scenario();
        let resolver = built(&store);
        resolver.lookup(&store, "/Docs").unwrap();
        resolver.lookup(&store, "/Docs").unwrap();
        let _ = resolver.lookup(&store, "/nope");

        let stats = resolver.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 66.666).abs() < 0.1);
        assert_eq!(ResolverStats::default().hit_rate(), 0.0);
    }
}
