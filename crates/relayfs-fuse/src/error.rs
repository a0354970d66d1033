//! Errors at the FUSE boundary and their errno mapping.

use relayfs_core::FsError;
use thiserror::Error;

/// Failures of a FUSE request.
#[derive(Debug, Error)]
pub enum FuseError {
    /// The passthrough operation itself failed.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// The kernel referenced an inode this mount does not know.
    #[error("Invalid inode: {0}")]
    InvalidInode(u64),

    /// The kernel referenced a file handle this mount does not know.
    #[error("Invalid file handle: {0}")]
    InvalidHandle(u64),

    /// A directory handle was used for file I/O or the reverse.
    #[error("Wrong handle type for operation")]
    WrongHandleType,

    /// A name from the kernel could not be joined onto its parent.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// A mutating request on a read-only mount.
    #[error("Filesystem is mounted read-only")]
    ReadOnly,
}

impl FuseError {
    /// Converts this error to a libc error code for the kernel.
    pub fn to_errno(&self) -> i32 {
        match self {
            FuseError::Fs(e) => e.to_errno(),
            FuseError::InvalidInode(_) => libc::ENOENT,
            FuseError::InvalidHandle(_) | FuseError::WrongHandleType => libc::EBADF,
            FuseError::InvalidName(_) => libc::EINVAL,
            FuseError::ReadOnly => libc::EROFS,
        }
    }
}

/// Result type for FUSE operations.
pub type FuseResult<T> = Result<T, FuseError>;
