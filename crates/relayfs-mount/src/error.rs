//! Errors raised while preparing a mount.

use std::path::PathBuf;
use thiserror::Error;

/// Why a mount point cannot be used.
#[derive(Debug, Error)]
pub enum MountError {
    /// The mount point does not exist.
    #[error("Mount point {} does not exist", .0.display())]
    MountpointMissing(PathBuf),

    /// The mount point exists but is not a directory.
    #[error("Mount point {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// The mount point did not answer in time, usually a dead FUSE mount.
    #[error(
        "Mount point {} is unresponsive. Unmount the stale filesystem first (fusermount -u).",
        .0.display()
    )]
    StaleMount(PathBuf),

    /// Mount point and backing root overlap.
    #[error(
        "Mount point {} and backing root {} overlap; the mount would expose itself",
        mountpoint.display(),
        backing_root.display()
    )]
    Overlapping {
        /// The requested mount point.
        mountpoint: PathBuf,
        /// The backing root.
        backing_root: PathBuf,
    },

    /// The kernel refused the mount or the mount never became ready.
    #[error("Failed to mount at {}: {source}", path.display())]
    Mount {
        /// The mount point.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure while checking a path.
    #[error("Error accessing {}: {source}", path.display())]
    Io {
        /// Path being checked.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}
