//! Mounting a [`RelayFS`] through fuser.

use crate::{MountConfig, RelayFS};
use fuser::{BackgroundSession, MountOption};
use relayfs_mount::MountError;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// How long `spawn_mount2` may block before the mount point is presumed stale.
pub const MOUNT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a graceful session join before falling back to a lazy unmount.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Handle to a mounted filesystem. Dropping it unmounts.
pub struct FuseMountHandle {
    session: Option<BackgroundSession>,
    mountpoint: PathBuf,
}

impl FuseMountHandle {
    /// Where the filesystem is mounted.
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Unmounts and waits for the session thread to finish.
    pub fn unmount(mut self) {
        tracing::info!(mountpoint = %self.mountpoint.display(), "Unmounting FUSE filesystem");
        if let Some(session) = self.session.take() {
            session.join();
        }
        tracing::info!(mountpoint = %self.mountpoint.display(), "FUSE unmount successful");
    }

    fn lazy_unmount(&self) {
        #[cfg(target_os = "linux")]
        {
            let _ = std::process::Command::new("fusermount")
                .arg("-uz")
                .arg(&self.mountpoint)
                .output();
        }

        #[cfg(target_os = "macos")]
        {
            let _ = std::process::Command::new("umount")
                .arg("-f")
                .arg(&self.mountpoint)
                .output();
        }
    }
}

impl Drop for FuseMountHandle {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        tracing::debug!("Unmounting FUSE filesystem at {}", self.mountpoint.display());

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            session.join();
            let _ = tx.send(());
        });

        if rx.recv_timeout(JOIN_TIMEOUT).is_err() {
            tracing::warn!(
                "session.join() timed out after {:?} for {}, forcing unmount",
                JOIN_TIMEOUT,
                self.mountpoint.display()
            );
            self.lazy_unmount();
        }
    }
}

/// Builds the fuser mount options for `config`.
pub fn mount_options(config: &MountConfig) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::FSName(config.fsname.clone()),
        MountOption::Subtype("relayfs".to_string()),
    ];
    if config.auto_unmount {
        options.push(MountOption::AutoUnmount);
    }
    if config.read_only {
        options.push(MountOption::RO);
    } else {
        options.push(MountOption::RW);
    }
    options
}

/// Returns true when the platform's FUSE support appears to be installed.
pub fn is_available() -> bool {
    #[cfg(target_os = "linux")]
    {
        Path::new("/dev/fuse").exists()
    }
    #[cfg(target_os = "macos")]
    {
        Path::new("/Library/Filesystems/macfuse.fs").exists()
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        false
    }
}

/// Mounts `fs` at `mountpoint` in a background session.
///
/// The mount runs on its own thread so a mount syscall stuck on a dead
/// mount point surfaces as [`MountError::StaleMount`] instead of hanging.
pub fn mount(fs: RelayFS, mountpoint: &Path) -> Result<FuseMountHandle, MountError> {
    let options = mount_options(fs.config());
    let target = mountpoint.to_path_buf();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        let result = fuser::spawn_mount2(fs, &target, &options);
        let _ = tx.send(result);
    });

    let session = match rx.recv_timeout(MOUNT_TIMEOUT) {
        Ok(Ok(session)) => session,
        Ok(Err(source)) => {
            return Err(MountError::Mount {
                path: mountpoint.to_path_buf(),
                source,
            });
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            return Err(MountError::StaleMount(mountpoint.to_path_buf()));
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            return Err(MountError::Mount {
                path: mountpoint.to_path_buf(),
                source: std::io::Error::other("mount thread terminated unexpectedly"),
            });
        }
    };

    let handle = FuseMountHandle {
        session: Some(session),
        mountpoint: mountpoint.to_path_buf(),
    };
    wait_for_mount(mountpoint, MOUNT_TIMEOUT)?;
    tracing::info!(mountpoint = %mountpoint.display(), "FUSE filesystem mounted");
    Ok(handle)
}

/// Polls until `mountpoint` sits on a different device than its parent.
#[cfg(unix)]
fn wait_for_mount(mountpoint: &Path, timeout: Duration) -> Result<(), MountError> {
    use std::os::unix::fs::MetadataExt;

    let parent = mountpoint.parent().unwrap_or(Path::new("/"));
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let (Ok(path_meta), Ok(parent_meta)) =
            (std::fs::metadata(mountpoint), std::fs::metadata(parent))
            && path_meta.dev() != parent_meta.dev()
        {
            tracing::debug!(
                "FUSE mount confirmed active at {} (dev {} != parent dev {})",
                mountpoint.display(),
                path_meta.dev(),
                parent_meta.dev()
            );
            return Ok(());
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    Err(MountError::Mount {
        path: mountpoint.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("mount did not become ready within {timeout:?}"),
        ),
    })
}

#[cfg(not(unix))]
fn wait_for_mount(_mountpoint: &Path, _timeout: Duration) -> Result<(), MountError> {
    Ok(())
}
