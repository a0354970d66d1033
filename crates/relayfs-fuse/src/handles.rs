//! Per-open state kept between FUSE requests.
//!
//! Every `open`/`opendir` gets its own entry; nothing is shared between
//! two opens of the same path.

use crate::error::{FuseError, FuseResult};
use relayfs_core::{DirectoryHandle, OpenFile};
use relayfs_mount::HandleTable;

/// State behind one kernel file handle.
#[derive(Debug)]
pub enum FuseHandle {
    /// A regular open file.
    File(OpenFile),
    /// An open directory stream.
    Directory(DirectoryHandle),
}

impl FuseHandle {
    /// Returns the open file, or `WrongHandleType` for a directory.
    pub fn as_file(&self) -> FuseResult<&OpenFile> {
        match self {
            FuseHandle::File(file) => Ok(file),
            FuseHandle::Directory(_) => Err(FuseError::WrongHandleType),
        }
    }

    /// Returns the directory stream, or `WrongHandleType` for a file.
    pub fn as_directory_mut(&mut self) -> FuseResult<&mut DirectoryHandle> {
        match self {
            FuseHandle::Directory(dir) => Ok(dir),
            FuseHandle::File(_) => Err(FuseError::WrongHandleType),
        }
    }

    /// Returns true for directory handles.
    pub fn is_directory(&self) -> bool {
        matches!(self, FuseHandle::Directory(_))
    }
}

/// Handle table used by the FUSE bridge.
pub type FuseHandleTable = HandleTable<FuseHandle>;
