//! Node creation and removal.
//!
//! Every call resolves its path and forwards to the matching system call.
//! Errors come back classified; nothing is retried.

use crate::attr::NodeKind;
use crate::error::{FsError, FsResult};
use crate::path::{ResolvedPath, VirtualPath};
use crate::session::SessionContext;
use nix::sys::stat::{Mode, SFlag};
use std::fs::{self, DirBuilder, OpenOptions};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use tracing::debug;

fn perm_bits(mode: u32) -> u32 {
    mode & 0o7777
}

#[allow(clippy::unnecessary_cast)]
fn nix_mode(mode: u32) -> Mode {
    Mode::from_bits_truncate(perm_bits(mode) as libc::mode_t)
}

/// Creates a node of the type encoded in `mode`.
///
/// Regular files (or a mode with no type bits) are created exclusively and
/// closed again, so an existing file is never truncated. FIFOs go through
/// `mkfifo`, every other type through `mknod` with `rdev`.
#[allow(clippy::unnecessary_cast, clippy::cast_possible_truncation)]
pub fn make_node(ctx: &SessionContext, path: &VirtualPath, mode: u32, rdev: u64) -> FsResult<()> {
    let resolved = ctx.resolve(path)?;
    let kind = NodeKind::from_mode(mode).unwrap_or(NodeKind::RegularFile);
    debug!(path = %path, ?kind, mode = format_args!("{mode:o}"), rdev, "make_node");

    match kind {
        NodeKind::RegularFile => create_exclusive(&resolved, mode),
        NodeKind::NamedPipe => nix::unistd::mkfifo(resolved.as_path(), nix_mode(mode))
            .map_err(|errno| FsError::from_errno(&resolved, errno)),
        _ => {
            let sflag = SFlag::from_bits_truncate((mode & u32::from(libc::S_IFMT)) as libc::mode_t);
            nix::sys::stat::mknod(resolved.as_path(), sflag, nix_mode(mode), rdev as libc::dev_t)
                .map_err(|errno| FsError::from_errno(&resolved, errno))
        }
    }
}

fn create_exclusive(resolved: &ResolvedPath, mode: u32) -> FsResult<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(perm_bits(mode))
        .open(resolved)
        .map(drop)
        .map_err(|e| FsError::from_io(resolved, e))
}

/// Creates a directory with the permission bits of `mode`.
pub fn make_directory(ctx: &SessionContext, path: &VirtualPath, mode: u32) -> FsResult<()> {
    let resolved = ctx.resolve(path)?;
    debug!(path = %path, mode = format_args!("{mode:o}"), "make_directory");
    DirBuilder::new()
        .mode(perm_bits(mode))
        .create(&resolved)
        .map_err(|e| FsError::from_io(&resolved, e))
}

/// Removes an empty directory.
pub fn remove_directory(ctx: &SessionContext, path: &VirtualPath) -> FsResult<()> {
    let resolved = ctx.resolve(path)?;
    debug!(path = %path, "remove_directory");
    fs::remove_dir(&resolved).map_err(|e| FsError::from_io(&resolved, e))
}

/// Unlinks a non-directory node.
pub fn remove_node(ctx: &SessionContext, path: &VirtualPath) -> FsResult<()> {
    let resolved = ctx.resolve(path)?;
    debug!(path = %path, "remove_node");
    fs::remove_file(&resolved).map_err(|e| FsError::from_io(&resolved, e))
}
