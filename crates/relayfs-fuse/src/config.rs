//! Mount configuration for the FUSE bridge.

use std::time::Duration;

/// Default TTL for attributes and entries handed to the kernel.
///
/// Every answer comes straight from the backing tree, so a short TTL keeps
/// changes made behind the mount visible quickly.
pub const DEFAULT_TTL: Duration = Duration::from_secs(1);

/// Default filesystem name shown in the mount table.
pub const DEFAULT_FSNAME: &str = "relayfs";

/// Options that shape how the filesystem is mounted.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// TTL for attributes returned by `getattr` and friends.
    pub attr_ttl: Duration,

    /// TTL for name lookups returned by `lookup`, `mknod` and `mkdir`.
    pub entry_ttl: Duration,

    /// Filesystem name shown in the mount table (`FSName=` option).
    pub fsname: String,

    /// Mount read-only. Mutating operations are refused with `EROFS`.
    pub read_only: bool,

    /// Ask the kernel to unmount when the process exits.
    pub auto_unmount: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            attr_ttl: DEFAULT_TTL,
            entry_ttl: DEFAULT_TTL,
            fsname: DEFAULT_FSNAME.to_string(),
            read_only: false,
            auto_unmount: true,
        }
    }
}

impl MountConfig {
    /// Sets the attribute TTL.
    #[must_use]
    pub fn attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }

    /// Sets the entry TTL.
    #[must_use]
    pub fn entry_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Sets the filesystem name.
    #[must_use]
    pub fn fsname(mut self, name: impl Into<String>) -> Self {
        self.fsname = name.into();
        self
    }

    /// Mounts read-only.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Enables or disables auto-unmount.
    #[must_use]
    pub fn auto_unmount(mut self, auto_unmount: bool) -> Self {
        self.auto_unmount = auto_unmount;
        self
    }
}
