//! The operation table.
//!
//! [`Dispatcher`] is the single entry point the kernel bridge talks to. Each
//! method records one diagnostics line, runs the matching component and
//! hands back a typed result. Translating that result into the runtime's
//! `0 / -errno` convention is left to [`status`] (or to the bridge itself).

use crate::attr::{self, NodeDescriptor};
use crate::diag;
use crate::dirstream::{self, DirectoryHandle, EntrySink};
use crate::error::{FsError, FsResult};
use crate::file::OpenFile;
use crate::node;
use crate::path::VirtualPath;
use crate::session::SessionContext;
use std::sync::Arc;
use tracing::{debug, info};

/// Operations the dispatcher answers. Anything else is left to the
/// runtime's defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Session start; adjusts connection tuning.
    Init,
    /// `getattr`
    GetAttributes,
    /// Opens a file for I/O.
    Open,
    /// Positional read on an open file.
    Read,
    /// Positional write on an open file.
    Write,
    /// Closes an open file.
    Release,
    /// Creates a regular file, FIFO or device node.
    MakeNode,
    /// `mkdir`
    MakeDirectory,
    /// Removes an empty directory.
    RemoveDirectory,
    /// Unlinks a non-directory.
    RemoveNode,
    /// Opens a directory stream.
    OpenDirectory,
    /// Reads entries from an open directory stream.
    EnumerateDirectory,
    /// Closes a directory stream.
    ReleaseDirectory,
    /// Usage figures of the backing filesystem.
    Statfs,
}

impl Operation {
    /// Every registered operation.
    pub const SUPPORTED: [Self; 14] = [
        Self::Init,
        Self::GetAttributes,
        Self::Open,
        Self::Read,
        Self::Write,
        Self::Release,
        Self::MakeNode,
        Self::MakeDirectory,
        Self::RemoveDirectory,
        Self::RemoveNode,
        Self::OpenDirectory,
        Self::EnumerateDirectory,
        Self::ReleaseDirectory,
        Self::Statfs,
    ];

    /// Short name used in diagnostics records.
    pub fn name(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::GetAttributes => "getattr",
            Self::Open => "open",
            Self::Read => "read",
            Self::Write => "write",
            Self::Release => "release",
            Self::MakeNode => "mknod",
            Self::MakeDirectory => "mkdir",
            Self::RemoveDirectory => "rmdir",
            Self::RemoveNode => "unlink",
            Self::OpenDirectory => "opendir",
            Self::EnumerateDirectory => "readdir",
            Self::ReleaseDirectory => "releasedir",
            Self::Statfs => "statfs",
        }
    }
}

/// Connection settings the init hook may adjust.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionTuning {
    /// Keep cached file contents across opens instead of flushing them.
    pub kernel_cache: bool,
}

/// Filesystem usage of the backing root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsStats {
    /// Total data blocks, in `fragment_size` units.
    pub blocks: u64,
    /// Free blocks.
    pub blocks_free: u64,
    /// Free blocks available to unprivileged users.
    pub blocks_available: u64,
    /// Total inodes.
    pub files: u64,
    /// Free inodes.
    pub files_free: u64,
    /// Preferred I/O block size.
    pub block_size: u32,
    /// Fundamental block size.
    pub fragment_size: u32,
    /// Longest file name the backing filesystem accepts.
    pub name_max: u32,
}

/// Routes operations to their components.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    ctx: Arc<SessionContext>,
}

impl Dispatcher {
    /// Creates a dispatcher over `ctx`.
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    /// The session every operation runs against.
    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    /// Runs once before any other operation. Enables kernel caching and
    /// returns the session so the runtime can carry it as private data.
    pub fn init(&self, tuning: &mut ConnectionTuning) -> Arc<SessionContext> {
        diag!(
            self.ctx.diagnostics(),
            "`{}` setting kernel cache flag; cached file contents survive open",
            Operation::Init.name()
        );
        tuning.kernel_cache = true;
        info!(backing_root = %self.ctx.backing_root().display(), "filesystem initialized");
        Arc::clone(&self.ctx)
    }

    /// Attributes of `path`.
    pub fn get_attributes(&self, path: &VirtualPath) -> FsResult<NodeDescriptor> {
        self.record(Operation::GetAttributes, format_args!("path=\"{path}\""));
        attr::get_attributes(&self.ctx, path)
    }

    /// Opens `path` with the caller's flags.
    pub fn open(&self, path: &VirtualPath, flags: i32) -> FsResult<OpenFile> {
        self.record(Operation::Open, format_args!("path=\"{path}\", flags=0x{flags:08x}"));
        OpenFile::open(&self.ctx, path, flags)
    }

    /// Reads from an open file.
    pub fn read(&self, file: &OpenFile, offset: u64, size: usize) -> FsResult<Vec<u8>> {
        self.record(
            Operation::Read,
            format_args!("path=\"{}\", offset={offset}, size={size}", file.path()),
        );
        file.read_at(offset, size)
    }

    /// Writes to an open file.
    pub fn write(&self, file: &OpenFile, offset: u64, data: &[u8]) -> FsResult<usize> {
        self.record(
            Operation::Write,
            format_args!("path=\"{}\", offset={offset}, size={}", file.path(), data.len()),
        );
        file.write_at(offset, data)
    }

    /// Closes an open file.
    pub fn release(&self, file: OpenFile) {
        self.record(Operation::Release, format_args!("path=\"{}\"", file.path()));
        drop(file);
    }

    /// Creates a node; see [`node::make_node`].
    pub fn make_node(&self, path: &VirtualPath, mode: u32, rdev: u64) -> FsResult<()> {
        self.record(
            Operation::MakeNode,
            format_args!("path=\"{path}\", mode=0{mode:3o}, dev={rdev}"),
        );
        node::make_node(&self.ctx, path, mode, rdev)
    }

    /// Creates a directory.
    pub fn make_directory(&self, path: &VirtualPath, mode: u32) -> FsResult<()> {
        self.record(
            Operation::MakeDirectory,
            format_args!("path=\"{path}\", mode=0{mode:3o}"),
        );
        node::make_directory(&self.ctx, path, mode)
    }

    /// Removes an empty directory.
    pub fn remove_directory(&self, path: &VirtualPath) -> FsResult<()> {
        self.record(Operation::RemoveDirectory, format_args!("path=\"{path}\""));
        node::remove_directory(&self.ctx, path)
    }

    /// Unlinks a non-directory.
    pub fn remove_node(&self, path: &VirtualPath) -> FsResult<()> {
        self.record(Operation::RemoveNode, format_args!("path=\"{path}\""));
        node::remove_node(&self.ctx, path)
    }

    /// Opens a directory stream.
    pub fn open_directory(&self, path: &VirtualPath) -> FsResult<DirectoryHandle> {
        self.record(Operation::OpenDirectory, format_args!("path=\"{path}\""));
        DirectoryHandle::open(&self.ctx, path)
    }

    /// Streams directory entries into `sink`; see [`dirstream::enumerate`].
    pub fn enumerate_directory<S>(
        &self,
        handle: &mut DirectoryHandle,
        sink: &mut S,
        offset: i64,
    ) -> FsResult<()>
    where
        S: EntrySink + ?Sized,
    {
        self.record(
            Operation::EnumerateDirectory,
            format_args!("path=\"{}\", offset={offset}", handle.path()),
        );
        let result = dirstream::enumerate(handle, sink, offset);
        if let Err(FsError::OutOfResources { delivered }) = &result {
            diag!(
                self.ctx.diagnostics(),
                "`{}` entry buffer full after {delivered} entries",
                Operation::EnumerateDirectory.name()
            );
        }
        result
    }

    /// Closes a directory stream.
    pub fn release_directory(&self, handle: DirectoryHandle) {
        self.record(
            Operation::ReleaseDirectory,
            format_args!("path=\"{}\"", handle.path()),
        );
        drop(handle);
    }

    /// Usage figures of the filesystem holding the backing root.
    #[allow(clippy::cast_possible_truncation, clippy::unnecessary_cast)]
    pub fn statfs(&self) -> FsResult<FsStats> {
        self.record(Operation::Statfs, format_args!("path=\"/\""));
        let root = self.ctx.backing_root();
        let st = nix::sys::statvfs::statvfs(root)
            .map_err(|errno| FsError::from_errno(root, errno))?;
        Ok(FsStats {
            blocks: st.blocks() as u64,
            blocks_free: st.blocks_free() as u64,
            blocks_available: st.blocks_available() as u64,
            files: st.files() as u64,
            files_free: st.files_free() as u64,
            block_size: st.block_size() as u32,
            fragment_size: st.fragment_size() as u32,
            name_max: st.name_max() as u32,
        })
    }

    fn record(&self, op: Operation, details: std::fmt::Arguments<'_>) {
        debug!(op = op.name(), "{details}");
        diag!(self.ctx.diagnostics(), "`{}` {}", op.name(), details);
    }
}

/// `0` on success, `-errno` on failure.
pub fn status<T>(result: &FsResult<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => -e.to_errno(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{AttrPolicy, NodeKind};
    use crate::diagnostics::DiagnosticsSink;
    use crate::diagnostics::tests::SharedBuffer;
    use crate::dirstream::{BoundedSink, DirEntry};

    fn setup() -> (tempfile::TempDir, SharedBuffer, Dispatcher) {
        let dir = tempfile::tempdir().unwrap();
        let buffer = SharedBuffer::default();
        let ctx = SessionContext::new(dir.path(), DiagnosticsSink::from_writer(buffer.clone()));
        (dir, buffer, Dispatcher::new(Arc::new(ctx)))
    }

    fn vp(s: &str) -> VirtualPath {
        VirtualPath::parse(s).unwrap()
    }

    #[test]
    fn test_init_enables_kernel_cache() {
        let (_dir, buffer, dispatcher) = setup();
        let mut tuning = ConnectionTuning::default();
        let ctx = dispatcher.init(&mut tuning);
        assert!(tuning.kernel_cache);
        assert!(Arc::ptr_eq(&ctx, dispatcher.context()));
        assert!(buffer.contents().contains("`init`"));
    }

    #[test]
    fn test_operation_names_are_unique() {
        let mut names: Vec<_> = Operation::SUPPORTED.iter().map(|op| op.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Operation::SUPPORTED.len());
    }

    #[test]
    fn test_status_convention() {
        let ok: FsResult<()> = Ok(());
        assert_eq!(status(&ok), 0);
        let err: FsResult<()> = Err(FsError::NotEmpty { path: "/d".into() });
        assert_eq!(status(&err), -libc::ENOTEMPTY);
    }

    #[test]
    fn test_each_call_records_one_line() {
        let (dir, buffer, dispatcher) = setup();
        std::fs::write(dir.path().join("f"), b"x").unwrap();
        dispatcher.get_attributes(&vp("/f")).unwrap();

        let out = buffer.contents();
        let getattr: Vec<_> = out.lines().filter(|l| l.contains("`getattr`")).collect();
        assert_eq!(getattr.len(), 1);
        assert!(getattr[0].contains("path=\"/f\""));
    }

    #[test]
    fn test_read_and_write_are_recorded() {
        let (dir, buffer, dispatcher) = setup();
        std::fs::write(dir.path().join("f"), b"").unwrap();
        let file = dispatcher.open(&vp("/f"), libc::O_RDWR).unwrap();
        dispatcher.write(&file, 0, b"hello").unwrap();
        dispatcher.read(&file, 1, 64).unwrap();
        dispatcher.release(file);

        let out = buffer.contents();
        let writes: Vec<_> = out.lines().filter(|l| l.contains("`write`")).collect();
        let reads: Vec<_> = out.lines().filter(|l| l.contains("`read`")).collect();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].contains("path=\"/f\", offset=0, size=5"));
        assert_eq!(reads.len(), 1);
        assert!(reads[0].contains("path=\"/f\", offset=1, size=64"));
    }

    #[test]
    fn test_mknod_records_mode_and_dev() {
        let (_dir, buffer, dispatcher) = setup();
        dispatcher.make_node(&vp("/n"), 0o100_644, 0).unwrap();
        assert!(buffer.contents().contains("`mknod` path=\"/n\", mode=0100644, dev=0"));
    }

    #[test]
    fn test_round_trip_through_dispatcher() {
        let (_dir, _buffer, dispatcher) = setup();
        dispatcher.make_directory(&vp("/d"), 0o755).unwrap();
        dispatcher.make_node(&vp("/d/f"), u32::from(libc::S_IFREG) | 0o644, 0).unwrap();

        let file = dispatcher.open(&vp("/d/f"), libc::O_RDWR).unwrap();
        assert_eq!(dispatcher.write(&file, 0, b"abc").unwrap(), 3);
        assert_eq!(dispatcher.read(&file, 0, 10).unwrap(), b"abc");
        dispatcher.release(file);

        let attr = dispatcher.get_attributes(&vp("/d/f")).unwrap();
        assert_eq!(attr.kind, NodeKind::RegularFile);
        assert_eq!(attr.size, 3);

        let err = dispatcher.remove_directory(&vp("/d")).unwrap_err();
        assert_eq!(status::<()>(&Err(err)), -libc::ENOTEMPTY);
        dispatcher.remove_node(&vp("/d/f")).unwrap();
        dispatcher.remove_directory(&vp("/d")).unwrap();
    }

    #[test]
    fn test_enumerate_records_buffer_full() {
        let (_dir, buffer, dispatcher) = setup();
        let mut handle = dispatcher.open_directory(&VirtualPath::root()).unwrap();
        let err = dispatcher
            .enumerate_directory(&mut handle, &mut BoundedSink::new(1), 0)
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(buffer.contents().contains("entry buffer full after 1 entries"));

        let mut rest = Vec::<DirEntry>::new();
        dispatcher.enumerate_directory(&mut handle, &mut rest, 1).unwrap();
        assert_eq!(rest.len(), 1);
        dispatcher.release_directory(handle);
    }

    #[test]
    fn test_synthetic_policy_through_dispatcher() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SessionContext::new(dir.path(), DiagnosticsSink::disabled())
            .with_attr_policy(AttrPolicy::Synthetic);
        let dispatcher = Dispatcher::new(Arc::new(ctx));
        let attr = dispatcher.get_attributes(&vp("/anything")).unwrap();
        assert_eq!(attr.size, 1024);
    }

    #[test]
    fn test_statfs() {
        let (_dir, _buffer, dispatcher) = setup();
        let stats = dispatcher.statfs().unwrap();
        assert!(stats.block_size > 0);
        assert!(stats.name_max > 0);
    }
}
