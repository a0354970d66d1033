//! Inode bookkeeping for the FUSE bridge.
//!
//! The core works on [`VirtualPath`]s; the kernel works on inode numbers.
//! [`InodeTable`] keeps the mapping on top of [`PathTable`] and adds the
//! `nlookup` counting FUSE requires: `lookup`, `mknod` and `mkdir` add a
//! reference, `forget` drops them, and an entry is evicted once its count
//! reaches zero.

use dashmap::mapref::one::Ref;
use relayfs_core::VirtualPath;
use relayfs_mount::PathTable;
use std::sync::atomic::{AtomicU64, Ordering};

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

/// One inode known to the kernel.
#[derive(Debug)]
pub struct InodeEntry {
    /// Virtual path the inode was handed out for.
    pub path: VirtualPath,
    nlookup: AtomicU64,
}

impl InodeEntry {
    fn with_count(path: VirtualPath, count: u64) -> Self {
        Self {
            path,
            nlookup: AtomicU64::new(count),
        }
    }

    /// Current lookup count.
    pub fn nlookup(&self) -> u64 {
        self.nlookup.load(Ordering::Relaxed)
    }

    fn inc_nlookup(&self) -> u64 {
        self.nlookup.fetch_add(1, Ordering::Relaxed) + 1
    }

    // Saturates at zero; the kernel never forgets more than it looked up,
    // but a confused count must not wrap around.
    fn dec_nlookup(&self, count: u64) -> u64 {
        let mut current = self.nlookup.load(Ordering::Acquire);
        loop {
            let next = current.saturating_sub(count);
            match self.nlookup.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Thread-safe mapping between inode numbers and virtual paths.
#[derive(Debug)]
pub struct InodeTable {
    inner: PathTable<InodeEntry>,
}

impl InodeTable {
    /// Creates a table holding only the root inode.
    pub fn new() -> Self {
        Self {
            inner: PathTable::with_root(ROOT_INODE, InodeEntry::with_count(VirtualPath::root(), 1)),
        }
    }

    /// Returns the inode for `path`, allocating one if needed, and adds one
    /// lookup reference.
    pub fn get_or_insert(&self, path: &VirtualPath) -> u64 {
        if let Some(inode) = self.inner.get_id(path)
            && let Some(entry) = self.inner.get(inode)
        {
            entry.inc_nlookup();
            return inode;
        }
        let inode = self
            .inner
            .get_or_insert_with(path, || InodeEntry::with_count(path.clone(), 0));
        if let Some(entry) = self.inner.get(inode) {
            entry.inc_nlookup();
        }
        inode
    }

    /// Inode number to report for a `readdir` entry.
    ///
    /// Plain `readdir` takes no kernel reference, so nothing is allocated:
    /// a path the kernel already knows keeps its inode, anything else is
    /// reported with the backing filesystem's number.
    pub fn listing_inode(&self, path: &VirtualPath, backing_ino: u64) -> u64 {
        self.inner.get_id(path).unwrap_or(backing_ino)
    }

    /// Looks up an inode.
    pub fn get(&self, inode: u64) -> Option<Ref<'_, u64, InodeEntry>> {
        self.inner.get(inode)
    }

    /// Returns the virtual path of `inode`.
    pub fn path(&self, inode: u64) -> Option<VirtualPath> {
        self.inner.get(inode).map(|entry| entry.path.clone())
    }

    /// Looks up the inode currently mapped to `path`.
    pub fn get_inode(&self, path: &VirtualPath) -> Option<u64> {
        self.inner.get_id(path)
    }

    /// Drops `nlookup` references. Returns true if the inode was evicted.
    /// The root is never evicted.
    pub fn forget(&self, inode: u64, nlookup: u64) -> bool {
        if inode == ROOT_INODE {
            return false;
        }
        let remaining = match self.inner.get(inode) {
            Some(entry) => entry.dec_nlookup(nlookup),
            None => return false,
        };
        remaining == 0 && self.inner.remove_by_id(inode).is_some()
    }

    /// Unmaps `path` after it was removed from the backing tree.
    ///
    /// The entry itself stays until the kernel forgets it, since the kernel
    /// may still send requests for that inode.
    pub fn invalidate_path(&self, path: &VirtualPath) {
        self.inner.invalidate_path(path);
    }

    /// Number of inodes, root included.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true when only the root is present.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
