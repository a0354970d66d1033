//! Attribute reporting.
//!
//! Two policies are supported:
//!
//! - [`AttrPolicy::Synthetic`] never touches the backing tree. The root is a
//!   directory, everything else a 1 KiB regular file, timestamps are "now".
//! - [`AttrPolicy::StatBacked`] `lstat`s the resolved path and reports its
//!   real metadata. This is what a mount should normally use.
//!
//! Both policies keep the link-count convention: directories report at
//! least 2 links.

use crate::error::{FsError, FsResult};
use crate::path::VirtualPath;
use crate::session::SessionContext;
use std::fs::{self, FileType, Metadata};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::trace;

/// Block size reported for every node.
pub const BLOCK_SIZE: u32 = 4096;

/// Default file permissions (rw-r--r--).
pub const DEFAULT_FILE_PERM: u16 = 0o644;

/// Default directory permissions (rwxr-xr-x).
pub const DEFAULT_DIR_PERM: u16 = 0o755;

/// Size reported for non-root nodes under [`AttrPolicy::Synthetic`].
pub const PLACEHOLDER_FILE_SIZE: u64 = 1024;

/// How [`get_attributes`] obtains metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttrPolicy {
    /// Fixed attributes without consulting the backing tree.
    Synthetic,
    /// Real metadata from `lstat` of the resolved path.
    #[default]
    StatBacked,
}

/// Type of a filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Directory.
    Directory,
    /// Regular file.
    RegularFile,
    /// Symbolic link (reported, never followed).
    Symlink,
    /// Named pipe.
    NamedPipe,
    /// Character device.
    CharDevice,
    /// Block device.
    BlockDevice,
    /// Unix domain socket.
    Socket,
}

impl NodeKind {
    /// Classifies a `std` file type.
    pub fn from_file_type(ft: FileType) -> Self {
        if ft.is_dir() {
            Self::Directory
        } else if ft.is_symlink() {
            Self::Symlink
        } else if ft.is_fifo() {
            Self::NamedPipe
        } else if ft.is_char_device() {
            Self::CharDevice
        } else if ft.is_block_device() {
            Self::BlockDevice
        } else if ft.is_socket() {
            Self::Socket
        } else {
            Self::RegularFile
        }
    }

    /// Classifies the `S_IFMT` bits of a mode. Returns `None` when no type
    /// bits are set.
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode & u32::from(libc::S_IFMT) {
            m if m == u32::from(libc::S_IFDIR) => Some(Self::Directory),
            m if m == u32::from(libc::S_IFREG) => Some(Self::RegularFile),
            m if m == u32::from(libc::S_IFLNK) => Some(Self::Symlink),
            m if m == u32::from(libc::S_IFIFO) => Some(Self::NamedPipe),
            m if m == u32::from(libc::S_IFCHR) => Some(Self::CharDevice),
            m if m == u32::from(libc::S_IFBLK) => Some(Self::BlockDevice),
            m if m == u32::from(libc::S_IFSOCK) => Some(Self::Socket),
            _ => None,
        }
    }
}

/// Metadata reported for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeDescriptor {
    /// Node type.
    pub kind: NodeKind,
    /// Permission bits (including setuid/setgid/sticky).
    pub perm: u16,
    /// Hard link count.
    pub nlink: u32,
    /// Owner.
    pub uid: u32,
    /// Group.
    pub gid: u32,
    /// Size in bytes.
    pub size: u64,
    /// Allocated 512-byte blocks.
    pub blocks: u64,
    /// Last access.
    pub atime: SystemTime,
    /// Last modification.
    pub mtime: SystemTime,
    /// Last status change.
    pub ctime: SystemTime,
    /// Device id for device nodes.
    pub rdev: u32,
    /// Preferred I/O block size.
    pub blksize: u32,
}

impl NodeDescriptor {
    /// Descriptor for a directory owned by `uid:gid`, timestamped `time`.
    pub fn directory(uid: u32, gid: u32, time: SystemTime) -> Self {
        Self {
            kind: NodeKind::Directory,
            perm: DEFAULT_DIR_PERM,
            nlink: 2,
            uid,
            gid,
            size: 0,
            blocks: 0,
            atime: time,
            mtime: time,
            ctime: time,
            rdev: 0,
            blksize: BLOCK_SIZE,
        }
    }

    /// Descriptor for a regular file of `size` bytes.
    pub fn regular_file(uid: u32, gid: u32, size: u64, time: SystemTime) -> Self {
        Self {
            kind: NodeKind::RegularFile,
            perm: DEFAULT_FILE_PERM,
            nlink: 1,
            uid,
            gid,
            size,
            blocks: size.div_ceil(512),
            atime: time,
            mtime: time,
            ctime: time,
            rdev: 0,
            blksize: BLOCK_SIZE,
        }
    }

    /// Builds a descriptor from backing-file metadata.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_metadata(meta: &Metadata) -> Self {
        let kind = NodeKind::from_file_type(meta.file_type());
        let nlink = meta.nlink().min(u64::from(u32::MAX)) as u32;
        Self {
            kind,
            perm: (meta.mode() & 0o7777) as u16,
            nlink: if kind == NodeKind::Directory { nlink.max(2) } else { nlink },
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.size(),
            blocks: meta.blocks(),
            atime: to_system_time(meta.atime(), meta.atime_nsec()),
            mtime: to_system_time(meta.mtime(), meta.mtime_nsec()),
            ctime: to_system_time(meta.ctime(), meta.ctime_nsec()),
            rdev: meta.rdev() as u32,
            blksize: meta.blksize().min(u64::from(u32::MAX)) as u32,
        }
    }
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn to_system_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = nsecs.clamp(0, 999_999_999) as u32;
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        UNIX_EPOCH - Duration::new(secs.unsigned_abs(), 0) + Duration::new(0, nanos)
    }
}

/// Reports the attributes of `path` according to the session's policy.
pub fn get_attributes(ctx: &SessionContext, path: &VirtualPath) -> FsResult<NodeDescriptor> {
    match ctx.attr_policy() {
        AttrPolicy::Synthetic => Ok(synthesize(ctx, path)),
        AttrPolicy::StatBacked => stat(ctx, path),
    }
}

/// Fixed attributes: `/` is a directory, everything else a placeholder file.
pub fn synthesize(ctx: &SessionContext, path: &VirtualPath) -> NodeDescriptor {
    let now = SystemTime::now();
    if path.is_root() {
        NodeDescriptor::directory(ctx.uid(), ctx.gid(), now)
    } else {
        NodeDescriptor::regular_file(ctx.uid(), ctx.gid(), PLACEHOLDER_FILE_SIZE, now)
    }
}

/// Real attributes from `lstat` of the resolved path.
pub fn stat(ctx: &SessionContext, path: &VirtualPath) -> FsResult<NodeDescriptor> {
    let resolved = ctx.resolve(path)?;
    let meta = fs::symlink_metadata(&resolved).map_err(|e| FsError::from_io(&resolved, e))?;
    let desc = NodeDescriptor::from_metadata(&meta);
    trace!(path = %path, kind = ?desc.kind, size = desc.size, nlink = desc.nlink, "stat");
    Ok(desc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticsSink;
    use crate::error::ErrorKind;

    fn vp(s: &str) -> VirtualPath {
        VirtualPath::parse(s).unwrap()
    }

    fn session(root: &std::path::Path, policy: AttrPolicy) -> SessionContext {
        SessionContext::new(root, DiagnosticsSink::disabled()).with_attr_policy(policy)
    }

    #[test]
    fn test_synthetic_root_is_directory() {
        let ctx = session(std::path::Path::new("/tmp/store"), AttrPolicy::Synthetic);
        let attr = get_attributes(&ctx, &VirtualPath::root()).unwrap();
        assert_eq!(attr.kind, NodeKind::Directory);
        assert_eq!(attr.nlink, 2);
        assert_eq!(attr.perm, 0o755);
        assert_eq!(attr.uid, ctx.uid());
        assert_eq!(attr.gid, ctx.gid());
    }

    #[test]
    fn test_synthetic_other_paths_are_placeholder_files() {
        let ctx = session(std::path::Path::new("/tmp/store"), AttrPolicy::Synthetic);
        for p in ["/x", "/does/not/exist", "/a/b/c.txt"] {
            let attr = get_attributes(&ctx, &vp(p)).unwrap();
            assert_eq!(attr.kind, NodeKind::RegularFile, "{p}");
            assert_eq!(attr.nlink, 1);
            assert_eq!(attr.perm, 0o644);
            assert_eq!(attr.size, PLACEHOLDER_FILE_SIZE);
        }
    }

    #[test]
    fn test_synthetic_timestamps_are_now() {
        let ctx = session(std::path::Path::new("/tmp/store"), AttrPolicy::Synthetic);
        let before = SystemTime::now();
        let attr = get_attributes(&ctx, &vp("/x")).unwrap();
        assert!(attr.mtime >= before);
        assert_eq!(attr.atime, attr.mtime);
    }

    #[test]
    fn test_stat_backed_reports_real_metadata() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), vec![7u8; 3000]).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let ctx = session(dir.path(), AttrPolicy::StatBacked);

        let file = get_attributes(&ctx, &vp("/data.bin")).unwrap();
        assert_eq!(file.kind, NodeKind::RegularFile);
        assert_eq!(file.size, 3000);
        assert_eq!(file.nlink, 1);

        let sub = get_attributes(&ctx, &vp("/sub")).unwrap();
        assert_eq!(sub.kind, NodeKind::Directory);
        assert!(sub.nlink >= 2);

        let root = get_attributes(&ctx, &VirtualPath::root()).unwrap();
        assert_eq!(root.kind, NodeKind::Directory);
    }

    #[test]
    fn test_stat_backed_missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = session(dir.path(), AttrPolicy::StatBacked);
        let err = get_attributes(&ctx, &vp("/missing")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_stat_backed_does_not_follow_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("nowhere", dir.path().join("link")).unwrap();
        let ctx = session(dir.path(), AttrPolicy::StatBacked);
        let attr = get_attributes(&ctx, &vp("/link")).unwrap();
        assert_eq!(attr.kind, NodeKind::Symlink);
    }

    #[test]
    fn test_kind_from_mode() {
        assert_eq!(
            NodeKind::from_mode(u32::from(libc::S_IFREG) | 0o644),
            Some(NodeKind::RegularFile)
        );
        assert_eq!(
            NodeKind::from_mode(u32::from(libc::S_IFIFO) | 0o600),
            Some(NodeKind::NamedPipe)
        );
        assert_eq!(NodeKind::from_mode(0o755), None);
    }

    #[test]
    fn test_negative_timestamps() {
        let t = to_system_time(-10, 500);
        assert!(t < UNIX_EPOCH);
    }
}
