//! Mount-side bookkeeping for relayfs.
//!
//! The core crate works on paths and owned handles; a kernel bridge works on
//! numeric inodes and file handles. This crate holds the tables that
//! translate between the two, plus the checks run before a mount starts.
//!
//! # Components
//!
//! - [`HandleTable`] - per-open state keyed by kernel file handle
//! - [`PathTable`] - `VirtualPath <-> u64` mapping with a pinned root id
//! - [`check_mountpoint`] - mount point validation against the backing root
//! - [`MountError`] - why a mount point was rejected

#![warn(missing_docs)]

mod error;
mod handle_table;
mod mount_utils;
pub mod path_table;

pub use error::MountError;
pub use handle_table::HandleTable;
pub use mount_utils::{
    DEFAULT_ACCESS_TIMEOUT, MountPointStatus, check_mountpoint, check_mountpoint_status,
    is_directory_empty, is_on_fuse_mount,
};
pub use path_table::PathTable;
