//! Error taxonomy for passthrough operations.
//!
//! Every component returns [`FsResult`]. Errors stay typed until they reach
//! the dispatch boundary, where [`FsError::to_errno`] (or
//! [`crate::dispatch::status`]) turns them into the errno convention the
//! kernel bridge expects.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced by passthrough filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// The target path does not exist in the backing tree.
    #[error("No such file or directory: {path}")]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// An exclusive create collided with an existing node.
    #[error("File already exists: {path}")]
    AlreadyExists {
        /// Path that already exists.
        path: PathBuf,
    },

    /// The backing filesystem refused access.
    #[error("Permission denied: {path}")]
    PermissionDenied {
        /// Path that was refused.
        path: PathBuf,
    },

    /// Directory removal on a directory that still has entries.
    #[error("Directory not empty: {path}")]
    NotEmpty {
        /// Directory that could not be removed.
        path: PathBuf,
    },

    /// The entry sink stopped accepting entries mid-enumeration.
    ///
    /// Recoverable: the caller re-invokes enumeration to continue.
    #[error("Entry sink exhausted after {delivered} entries")]
    OutOfResources {
        /// Entries accepted by the sink during this call.
        delivered: u64,
    },

    /// A virtual path failed validation.
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path, lossily rendered.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Joining the backing root and a virtual path would exceed `PATH_MAX`.
    #[error("Resolved path too long: {len} bytes (limit {max})")]
    PathTooLong {
        /// Length the joined path would have, without the terminating NUL.
        len: usize,
        /// Maximum length allowed, without the terminating NUL.
        max: usize,
    },

    /// A fresh directory stream ended before yielding `.` and `..`.
    #[error("Directory stream ended before its first entry: {path}")]
    TruncatedDirectory {
        /// Directory being enumerated.
        path: PathBuf,
    },

    /// Any other error reported by the backing filesystem.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path the failing call was made on.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

/// Result type for passthrough operations.
pub type FsResult<T> = Result<T, FsError>;

/// Semantic category of an [`FsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Target absent (ENOENT).
    NotFound,
    /// Exclusive create collision (EEXIST).
    AlreadyExists,
    /// Access refused (EACCES, or EPERM when the backing store said so).
    PermissionDenied,
    /// Directory not empty (ENOTEMPTY).
    NotEmpty,
    /// Sink exhausted, caller should retry (ENOMEM).
    OutOfResources,
    /// Malformed virtual path (EINVAL).
    InvalidArgument,
    /// Resolved path over the length limit (ENAMETOOLONG).
    NameTooLong,
    /// Catch-all for backing filesystem failures (errno passthrough or EIO).
    UnderlyingIo,
}

impl ErrorKind {
    /// Returns a human-readable name for this category.
    pub fn name(self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::PermissionDenied => "PermissionDenied",
            Self::NotEmpty => "NotEmpty",
            Self::OutOfResources => "OutOfResources",
            Self::InvalidArgument => "InvalidArgument",
            Self::NameTooLong => "NameTooLong",
            Self::UnderlyingIo => "UnderlyingIo",
        }
    }
}

impl FsError {
    /// Classifies an `io::Error` raised while operating on `path`.
    ///
    /// The raw OS error wins over `io::ErrorKind` so that EPERM and EACCES
    /// both land in [`ErrorKind::PermissionDenied`] while keeping their own
    /// errno through [`FsError::Io`].
    pub fn from_io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match source.raw_os_error() {
            Some(libc::ENOENT) => return Self::NotFound { path },
            Some(libc::EEXIST) => return Self::AlreadyExists { path },
            Some(libc::EACCES) => return Self::PermissionDenied { path },
            Some(libc::ENOTEMPTY) => return Self::NotEmpty { path },
            Some(_) => return Self::Io { path, source },
            None => {}
        }
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::AlreadyExists => Self::AlreadyExists { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            io::ErrorKind::DirectoryNotEmpty => Self::NotEmpty { path },
            _ => Self::Io { path, source },
        }
    }

    /// Classifies a `nix` errno raised while operating on `path`.
    pub fn from_errno(path: impl AsRef<Path>, errno: nix::errno::Errno) -> Self {
        Self::from_io(path, io::Error::from(errno))
    }

    /// Returns the semantic category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::NotEmpty { .. } => ErrorKind::NotEmpty,
            Self::OutOfResources { .. } => ErrorKind::OutOfResources,
            Self::InvalidPath { .. } => ErrorKind::InvalidArgument,
            Self::PathTooLong { .. } => ErrorKind::NameTooLong,
            Self::TruncatedDirectory { .. } => ErrorKind::UnderlyingIo,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::Io { source, .. } => match source.raw_os_error() {
                Some(libc::EPERM) => ErrorKind::PermissionDenied,
                _ => ErrorKind::UnderlyingIo,
            },
        }
    }

    /// Converts this error to a positive libc errno value.
    pub fn to_errno(&self) -> i32 {
        match self {
            Self::NotFound { .. } => libc::ENOENT,
            Self::AlreadyExists { .. } => libc::EEXIST,
            Self::PermissionDenied { .. } => libc::EACCES,
            Self::NotEmpty { .. } => libc::ENOTEMPTY,
            Self::OutOfResources { .. } => libc::ENOMEM,
            Self::InvalidPath { .. } => libc::EINVAL,
            Self::PathTooLong { .. } => libc::ENAMETOOLONG,
            Self::TruncatedDirectory { .. } => libc::EIO,
            Self::Io { source, .. } => source.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// Returns true if the caller may retry the same operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OutOfResources { .. })
    }
}
