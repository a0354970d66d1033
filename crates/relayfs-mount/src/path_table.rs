//! Bidirectional mapping between virtual paths and numeric ids.
//!
//! FUSE speaks inodes, the core speaks paths. [`PathTable`] keeps both
//! directions in `DashMap`s so either lookup is a single shard access.
//! Lifecycle policy (lookup counting, eviction) is left to the wrapper
//! that owns the entries.

use dashmap::DashMap;
use dashmap::mapref::one::Ref;
use relayfs_core::VirtualPath;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe `VirtualPath <-> u64` table with a pinned root entry.
///
/// ```
/// use relayfs_core::VirtualPath;
/// use relayfs_mount::PathTable;
///
/// let table = PathTable::with_root(1, "root");
/// let docs = VirtualPath::parse("/docs").unwrap();
/// let id = table.get_or_insert_with(&docs, || "docs");
/// assert!(id > 1);
/// assert_eq!(table.get_id(&docs), Some(id));
/// ```
pub struct PathTable<E> {
    path_to_id: DashMap<VirtualPath, u64>,
    id_to_entry: DashMap<u64, E>,
    next_id: AtomicU64,
    root_id: u64,
}

impl<E> PathTable<E> {
    /// Creates a table whose root (`/`) maps to `root_id`. Other ids are
    /// allocated upwards from `root_id + 1`.
    pub fn with_root(root_id: u64, root_entry: E) -> Self {
        let table = Self {
            path_to_id: DashMap::new(),
            id_to_entry: DashMap::new(),
            next_id: AtomicU64::new(root_id + 1),
            root_id,
        };
        table.path_to_id.insert(VirtualPath::root(), root_id);
        table.id_to_entry.insert(root_id, root_entry);
        table
    }

    /// The id of `/`.
    pub fn root_id(&self) -> u64 {
        self.root_id
    }

    /// Returns the id of `path`, creating an entry with `make_entry` if the
    /// path is not mapped yet.
    pub fn get_or_insert_with<F>(&self, path: &VirtualPath, make_entry: F) -> u64
    where
        F: FnOnce() -> E,
    {
        if let Some(id) = self.path_to_id.get(path) {
            return *id;
        }
        *self.path_to_id.entry(path.clone()).or_insert_with(|| {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            self.id_to_entry.insert(id, make_entry());
            id
        })
    }

    /// Looks up the id of `path`.
    pub fn get_id(&self, path: &VirtualPath) -> Option<u64> {
        self.path_to_id.get(path).map(|r| *r)
    }

    /// Looks up the entry for `id`.
    pub fn get(&self, id: u64) -> Option<Ref<'_, u64, E>> {
        self.id_to_entry.get(&id)
    }

    /// Removes the entry for `id` along with any path still mapped to it.
    /// The root cannot be removed.
    pub fn remove_by_id(&self, id: u64) -> Option<E> {
        if id == self.root_id {
            return None;
        }
        let (_, entry) = self.id_to_entry.remove(&id)?;
        self.path_to_id.retain(|_, v| *v != id);
        Some(entry)
    }

    /// Forgets the path mapping while keeping the entry, so a later lookup
    /// of the same path gets a fresh id. The root mapping is kept.
    pub fn invalidate_path(&self, path: &VirtualPath) {
        if path.is_root() {
            return;
        }
        self.path_to_id.remove(path);
    }

    /// Number of entries, root included.
    pub fn len(&self) -> usize {
        self.id_to_entry.len()
    }

    /// Returns true when only the root is present.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl<E> std::fmt::Debug for PathTable<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathTable")
            .field("entries", &self.id_to_entry.len())
            .field("paths", &self.path_to_id.len())
            .field("root_id", &self.root_id)
            .finish_non_exhaustive()
    }
}
