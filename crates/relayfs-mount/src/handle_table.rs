//! Concurrent table of open handles keyed by kernel-visible ids.
//!
//! Ids start at 1; 0 is what the kernel passes when no handle exists, so it
//! is never handed out. After the counter wraps, ids still in use are
//! skipped.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::{Ref, RefMut};
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe map from handle id to per-open state.
///
/// ```
/// use relayfs_mount::HandleTable;
///
/// let table: HandleTable<&str> = HandleTable::new();
/// let fh = table.insert("open file");
/// assert_eq!(fh, 1);
/// assert_eq!(table.remove(fh), Some("open file"));
/// assert!(table.is_empty());
/// ```
#[derive(Debug)]
pub struct HandleTable<V> {
    handles: DashMap<u64, V>,
    next_id: AtomicU64,
}

impl<V> HandleTable<V> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Stores `value` under a fresh id and returns the id.
    pub fn insert(&self, value: V) -> u64 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                continue;
            }
            if let Entry::Vacant(slot) = self.handles.entry(id) {
                slot.insert(value);
                return id;
            }
        }
    }

    /// Shared access to the handle `id`.
    pub fn get(&self, id: u64) -> Option<Ref<'_, u64, V>> {
        self.handles.get(&id)
    }

    /// Exclusive access to the handle `id`.
    ///
    /// Holding the guard blocks other access to the same shard; keep it
    /// short.
    pub fn get_mut(&self, id: u64) -> Option<RefMut<'_, u64, V>> {
        self.handles.get_mut(&id)
    }

    /// Removes and returns the handle `id`.
    pub fn remove(&self, id: u64) -> Option<V> {
        self.handles.remove(&id).map(|(_, v)| v)
    }

    /// Returns true if `id` is open.
    pub fn contains(&self, id: u64) -> bool {
        self.handles.contains_key(&id)
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true when no handle is open.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Drops every handle.
    pub fn clear(&self) {
        self.handles.clear();
    }
}

impl<V> Default for HandleTable<V> {
    fn default() -> Self {
        Self::new()
    }
}
