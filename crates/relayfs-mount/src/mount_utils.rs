//! Mount point checks.
//!
//! A FUSE daemon that died without unmounting leaves a mount point on which
//! every `stat` blocks forever. The probes here run on a helper thread and
//! give up after a timeout so the caller never hangs on such a path.

use crate::error::MountError;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for mount point probes.
pub const DEFAULT_ACCESS_TIMEOUT: Duration = Duration::from_millis(500);

/// Outcome of probing a prospective mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountPointStatus {
    /// Exists, is a directory, answers.
    Available,
    /// Did not answer within the timeout.
    StaleMountDetected,
    /// Nothing at that path.
    DoesNotExist,
    /// Exists but is not a directory.
    NotADirectory,
    /// Probe failed for another reason.
    Error(String),
}

/// Probes `path` on a helper thread.
pub fn check_mountpoint_status(path: &Path, timeout: Duration) -> MountPointStatus {
    let probe = path.to_path_buf();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        let status = match std::fs::metadata(&probe) {
            Ok(meta) if meta.is_dir() => match std::fs::read_dir(&probe) {
                Ok(mut entries) => {
                    let _ = entries.next();
                    MountPointStatus::Available
                }
                Err(e) => MountPointStatus::Error(e.to_string()),
            },
            Ok(_) => MountPointStatus::NotADirectory,
            Err(e) if e.kind() == io::ErrorKind::NotFound => MountPointStatus::DoesNotExist,
            // dead FUSE daemon
            Err(e) if e.raw_os_error() == Some(libc::ENOTCONN) => MountPointStatus::StaleMountDetected,
            Err(e) => MountPointStatus::Error(e.to_string()),
        };
        let _ = tx.send(status);
    });

    match rx.recv_timeout(timeout) {
        Ok(status) => status,
        Err(mpsc::RecvTimeoutError::Timeout) => MountPointStatus::StaleMountDetected,
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            MountPointStatus::Error("probe thread exited without reporting".to_string())
        }
    }
}

/// Returns true when `path` has no entries. Unreadable paths count as
/// non-empty.
pub fn is_directory_empty(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

/// Returns the FUSE mount point containing `path`, if any.
#[cfg(target_os = "linux")]
pub fn is_on_fuse_mount(path: &Path) -> Option<PathBuf> {
    let mounts = std::fs::read_to_string("/proc/mounts").ok()?;
    mounts
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let mount_point = fields.nth(1)?;
            let fs_type = fields.next()?;
            fs_type.starts_with("fuse").then(|| PathBuf::from(mount_point))
        })
        .filter(|mount_point| path.starts_with(mount_point))
        .max_by_key(|mount_point| mount_point.as_os_str().len())
}

/// Returns the FUSE mount point containing `path`, if any.
#[cfg(not(target_os = "linux"))]
pub fn is_on_fuse_mount(_path: &Path) -> Option<PathBuf> {
    None
}

/// Validates `mountpoint` against `backing_root` and returns its canonical
/// form.
///
/// The mount point must exist, be a responsive directory, and neither
/// contain nor sit inside the backing root. A non-empty mount point is
/// accepted with a warning since its contents are hidden while mounted.
pub fn check_mountpoint(mountpoint: &Path, backing_root: &Path) -> Result<PathBuf, MountError> {
    match check_mountpoint_status(mountpoint, DEFAULT_ACCESS_TIMEOUT) {
        MountPointStatus::Available => {}
        MountPointStatus::DoesNotExist => {
            return Err(MountError::MountpointMissing(mountpoint.to_path_buf()));
        }
        MountPointStatus::NotADirectory => {
            return Err(MountError::NotADirectory(mountpoint.to_path_buf()));
        }
        MountPointStatus::StaleMountDetected => {
            return Err(MountError::StaleMount(mountpoint.to_path_buf()));
        }
        MountPointStatus::Error(message) => {
            return Err(MountError::Io {
                path: mountpoint.to_path_buf(),
                source: io::Error::other(message),
            });
        }
    }

    let canonical = |p: &Path| {
        std::fs::canonicalize(p).map_err(|source| MountError::Io {
            path: p.to_path_buf(),
            source,
        })
    };
    let mountpoint = canonical(mountpoint)?;
    let backing_root = canonical(backing_root)?;

    if mountpoint.starts_with(&backing_root) || backing_root.starts_with(&mountpoint) {
        return Err(MountError::Overlapping {
            mountpoint,
            backing_root,
        });
    }

    if let Some(fuse_mount) = is_on_fuse_mount(&mountpoint) {
        debug!(mountpoint = %mountpoint.display(), fuse_mount = %fuse_mount.display(), "mount point lies on a FUSE filesystem");
    }
    if !is_directory_empty(&mountpoint) {
        warn!(mountpoint = %mountpoint.display(), "mount point is not empty; its contents are hidden while mounted");
    }
    Ok(mountpoint)
}
