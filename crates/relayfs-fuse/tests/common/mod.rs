//! Test mount harness for FUSE integration tests.
//!
//! [`TestMount`] mounts a fresh temporary backing directory and unmounts it
//! on drop. Tests can inspect the mounted view and the backing tree side by
//! side.

// Not all tests use all TestMount methods
#![allow(dead_code)]

use relayfs_core::{AttrPolicy, DiagnosticsSink, SessionContext};
use relayfs_fuse::{FuseMountHandle, MountConfig, RelayFS};
use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// A mounted temporary backing directory.
pub struct TestMount {
    handle: Option<FuseMountHandle>,
    /// Path where the filesystem is mounted.
    pub mount_path: PathBuf,
    /// Backing directory.
    pub backing: TempDir,
    _temp_mount: TempDir,
}

impl TestMount {
    /// Mounts an empty backing directory read-write.
    pub fn new() -> Result<Self, String> {
        Self::build(|_| {}, MountConfig::default())
    }

    /// Mounts a backing directory prepared by `setup`.
    pub fn with_backing(setup: impl FnOnce(&Path)) -> Result<Self, String> {
        Self::build(setup, MountConfig::default())
    }

    /// Mounts a backing directory prepared by `setup`, read-only.
    pub fn read_only(setup: impl FnOnce(&Path)) -> Result<Self, String> {
        Self::build(setup, MountConfig::default().read_only(true))
    }

    fn build(setup: impl FnOnce(&Path), config: MountConfig) -> Result<Self, String> {
        let backing = TempDir::new().map_err(|e| format!("Failed to create backing dir: {e}"))?;
        setup(backing.path());

        let temp_mount = TempDir::new().map_err(|e| format!("Failed to create temp dir: {e}"))?;
        let mount_path = temp_mount.path().join("mnt");
        fs::create_dir(&mount_path).map_err(|e| format!("Failed to create mount point: {e}"))?;

        let session = SessionContext::new(backing.path(), DiagnosticsSink::disabled())
            .with_attr_policy(AttrPolicy::StatBacked);
        let fs = RelayFS::with_config(
            Arc::new(session),
            config.fsname("relayfs-test").attr_ttl(Duration::ZERO).entry_ttl(Duration::ZERO),
        );
        let handle = relayfs_fuse::mount(fs, &mount_path).map_err(|e| format!("Failed to mount: {e}"))?;

        // macFUSE can report the mount ready before it answers requests
        thread::sleep(Duration::from_millis(100));

        Ok(Self {
            handle: Some(handle),
            mount_path,
            backing,
            _temp_mount: temp_mount,
        })
    }

    /// Path under the mount point.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.mount_path.join(relative.trim_start_matches('/'))
    }

    /// Path under the backing directory.
    pub fn backing_path(&self, relative: &str) -> PathBuf {
        self.backing.path().join(relative.trim_start_matches('/'))
    }

    /// Read a file's contents.
    pub fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        let mut content = Vec::new();
        File::open(self.path(path))?.read_to_end(&mut content)?;
        Ok(content)
    }

    /// Create a new file with `content`.
    pub fn write_new(&self, path: &str, content: &[u8]) -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(path))?;
        file.write_all(content)?;
        file.sync_all()?;
        Ok(())
    }

    /// Create a directory.
    pub fn mkdir(&self, path: &str) -> io::Result<()> {
        fs::create_dir(self.path(path))
    }

    /// Remove a file.
    pub fn remove(&self, path: &str) -> io::Result<()> {
        fs::remove_file(self.path(path))
    }

    /// Remove an empty directory.
    pub fn rmdir(&self, path: &str) -> io::Result<()> {
        fs::remove_dir(self.path(path))
    }

    /// Get metadata through the mount.
    pub fn metadata(&self, path: &str) -> io::Result<Metadata> {
        fs::metadata(self.path(path))
    }

    /// List directory entries (names only, sorted).
    pub fn list(&self, path: &str) -> io::Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(self.path(path))?
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }
}

impl Drop for TestMount {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.unmount();
        }
    }
}

/// Skip test if FUSE is not available.
#[macro_export]
macro_rules! skip_if_no_fuse {
    () => {
        if !relayfs_fuse::backend::is_available() {
            eprintln!("Skipping test: FUSE not available on this system");
            return;
        }
    };
}

/// Skip test if mounting fails (common in CI environments).
#[macro_export]
macro_rules! require_mount {
    ($mount_result:expr) => {
        match $mount_result {
            Ok(m) => m,
            Err(e) => {
                eprintln!("Skipping test: {}", e);
                return;
            }
        }
    };
}
