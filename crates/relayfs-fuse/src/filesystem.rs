//! The fuser `Filesystem` implementation.
//!
//! [`RelayFS`] translates inode-based kernel requests into path-based calls
//! on a [`Dispatcher`] and replies with whatever the backing tree says.
//!
//! | Operation | Notes |
//! |-----------|-------|
//! | init/destroy | init enables kernel caching (`FOPEN_KEEP_CACHE` on open) |
//! | lookup | `get_or_insert` adds one nlookup reference |
//! | forget/batch_forget | evicts at zero, never the root |
//! | getattr | attribute policy of the session |
//! | open/read/write/release | one `OpenFile` per open, positional I/O |
//! | flush/fsync | flush is a no-op, fsync syncs the backing file |
//! | opendir/readdir/releasedir | native stream per open, buffer full ends the reply |
//! | mknod/mkdir/unlink/rmdir | forwarded; no `create`, the kernel falls back to mknod + open |
//! | statfs | `statvfs` of the backing root |
//! | xattr | ENOTSUP |

use crate::config::MountConfig;
use crate::error::{FuseError, FuseResult};
use crate::handles::{FuseHandle, FuseHandleTable};
use crate::inode::{InodeTable, ROOT_INODE};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
};
use libc::c_int;
use relayfs_core::{
    ConnectionTuning, DirEntry, Dispatcher, EntrySink, FsError, NodeDescriptor, NodeKind,
    SessionContext, VirtualPath,
};
use std::ffi::OsStr;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Passthrough filesystem mounted through FUSE.
pub struct RelayFS {
    dispatcher: Dispatcher,
    inodes: InodeTable,
    handles: FuseHandleTable,
    config: MountConfig,
    tuning: ConnectionTuning,
    /// Session handed back by the init hook; present while mounted.
    session: Option<Arc<SessionContext>>,
}

impl RelayFS {
    /// Creates a filesystem over `session` with default mount options.
    pub fn new(session: Arc<SessionContext>) -> Self {
        Self::with_config(session, MountConfig::default())
    }

    /// Creates a filesystem over `session` with explicit mount options.
    pub fn with_config(session: Arc<SessionContext>, config: MountConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(session),
            inodes: InodeTable::new(),
            handles: FuseHandleTable::new(),
            config,
            tuning: ConnectionTuning::default(),
            session: None,
        }
    }

    /// Mount options in effect.
    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    /// Connection tuning chosen by the init hook.
    pub fn tuning(&self) -> ConnectionTuning {
        self.tuning
    }

    /// Runs the dispatcher's init hook. Called from [`Filesystem::init`].
    pub fn initialize(&mut self) -> Arc<SessionContext> {
        let session = self.dispatcher.init(&mut self.tuning);
        self.session = Some(Arc::clone(&session));
        session
    }

    fn path_of(&self, ino: u64) -> FuseResult<VirtualPath> {
        self.inodes.path(ino).ok_or(FuseError::InvalidInode(ino))
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> FuseResult<VirtualPath> {
        self.path_of(parent)?
            .join(name)
            .map_err(|_| FuseError::InvalidName(name.to_string_lossy().into_owned()))
    }

    fn ensure_writable(&self) -> FuseResult<()> {
        if self.config.read_only {
            return Err(FuseError::ReadOnly);
        }
        Ok(())
    }

    fn open_flags(&self) -> u32 {
        if self.tuning.kernel_cache {
            fuser::consts::FOPEN_KEEP_CACHE
        } else {
            0
        }
    }

    /// Creates `name` under `parent` through `create`, then reports it like
    /// a lookup would.
    fn make_entry<F>(&self, parent: u64, name: &OsStr, create: F) -> FuseResult<FileAttr>
    where
        F: FnOnce(&Dispatcher, &VirtualPath) -> Result<(), FsError>,
    {
        self.ensure_writable()?;
        let path = self.child_path(parent, name)?;
        create(&self.dispatcher, &path)?;
        let desc = self.dispatcher.get_attributes(&path)?;
        let ino = self.inodes.get_or_insert(&path);
        Ok(to_file_attr(ino, &desc))
    }

    fn remove_entry<F>(&self, parent: u64, name: &OsStr, remove: F) -> FuseResult<()>
    where
        F: FnOnce(&Dispatcher, &VirtualPath) -> Result<(), FsError>,
    {
        self.ensure_writable()?;
        let path = self.child_path(parent, name)?;
        remove(&self.dispatcher, &path)?;
        self.inodes.invalidate_path(&path);
        Ok(())
    }

    fn open_file(&self, ino: u64, flags: i32) -> FuseResult<u64> {
        if is_write_open(flags) {
            self.ensure_writable()?;
        }
        let path = self.path_of(ino)?;
        let file = self.dispatcher.open(&path, flags)?;
        Ok(self.handles.insert(FuseHandle::File(file)))
    }

    fn read_dir(
        &self,
        ino: u64,
        fh: u64,
        offset: i64,
        reply: &mut ReplyDirectory,
    ) -> FuseResult<()> {
        let mut handle = self.handles.get_mut(fh).ok_or(FuseError::InvalidHandle(fh))?;
        let dir = handle.as_directory_mut()?;

        // Offsets handed to the kernel are 1-based positions in the stream.
        let base = u64::try_from(offset).unwrap_or(0).min(dir.delivered());
        let dir_path = dir.path().clone();
        let mut sink = ReplySink {
            reply,
            ctx: self.dispatcher.context(),
            inodes: &self.inodes,
            dir_path: &dir_path,
            dir_ino: ino,
            next_offset: i64::try_from(base).unwrap_or(i64::MAX).saturating_add(1),
        };

        match self.dispatcher.enumerate_directory(dir, &mut sink, offset) {
            Ok(()) => Ok(()),
            Err(FsError::OutOfResources { delivered }) => {
                trace!(inode = ino, delivered, "readdir: reply buffer full");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Entry sink writing straight into a `readdir` reply buffer.
struct ReplySink<'a> {
    reply: &'a mut ReplyDirectory,
    ctx: &'a SessionContext,
    inodes: &'a InodeTable,
    dir_path: &'a VirtualPath,
    dir_ino: u64,
    next_offset: i64,
}

impl ReplySink<'_> {
    fn inode_for(&self, entry: &DirEntry) -> u64 {
        match entry.name.as_encoded_bytes() {
            b"." => self.dir_ino,
            b".." => self
                .dir_path
                .parent()
                .and_then(|parent| self.inodes.get_inode(&parent))
                .unwrap_or(ROOT_INODE),
            _ => match self.dir_path.join(&entry.name) {
                Ok(child) => self.inodes.listing_inode(&child, entry.ino),
                Err(_) => entry.ino,
            },
        }
    }
}

impl EntrySink for ReplySink<'_> {
    fn push(&mut self, entry: &DirEntry) -> bool {
        let ino = self.inode_for(entry);
        let kind = entry
            .kind
            .map_or_else(|| entry_kind(self.ctx, self.dir_path, entry), to_file_type);
        if self.reply.add(ino, self.next_offset, kind, &entry.name) {
            return false;
        }
        self.next_offset += 1;
        true
    }
}

// Backing filesystems may report DT_UNKNOWN; lstat the entry instead.
fn entry_kind(ctx: &SessionContext, dir_path: &VirtualPath, entry: &DirEntry) -> FileType {
    if entry.is_dot_or_dotdot() {
        return FileType::Directory;
    }
    let meta = dir_path
        .join(&entry.name)
        .and_then(|child| ctx.resolve(&child))
        .ok()
        .and_then(|resolved| std::fs::symlink_metadata(resolved.as_path()).ok());
    match meta {
        Some(meta) => to_file_type(NodeKind::from_file_type(meta.file_type())),
        None => {
            trace!(name = ?entry.name, "readdir: entry vanished before its type was known");
            FileType::RegularFile
        }
    }
}

fn to_file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::RegularFile => FileType::RegularFile,
        NodeKind::Symlink => FileType::Symlink,
        NodeKind::NamedPipe => FileType::NamedPipe,
        NodeKind::CharDevice => FileType::CharDevice,
        NodeKind::BlockDevice => FileType::BlockDevice,
        NodeKind::Socket => FileType::Socket,
    }
}

fn to_file_attr(ino: u64, desc: &NodeDescriptor) -> FileAttr {
    FileAttr {
        ino,
        size: desc.size,
        blocks: desc.blocks,
        atime: desc.atime,
        mtime: desc.mtime,
        ctime: desc.ctime,
        crtime: desc.ctime,
        kind: to_file_type(desc.kind),
        perm: desc.perm,
        nlink: desc.nlink,
        uid: desc.uid,
        gid: desc.gid,
        rdev: desc.rdev,
        blksize: desc.blksize,
        flags: 0,
    }
}

fn is_write_open(flags: i32) -> bool {
    (flags & libc::O_ACCMODE) != libc::O_RDONLY || (flags & libc::O_TRUNC) != 0
}

impl Filesystem for RelayFS {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        let session = self.initialize();
        info!(
            backing_root = %session.backing_root().display(),
            kernel_cache = self.tuning.kernel_cache,
            "FUSE filesystem initialized"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        let open = self.handles.len();
        if open > 0 {
            warn!(open, "unmounting with handles still open");
        }
        self.handles.clear();
        if let Some(session) = self.session.take() {
            info!(backing_root = %session.backing_root().display(), "FUSE filesystem destroyed");
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        trace!(parent, ?name, "lookup");
        let result = self.child_path(parent, name).and_then(|path| {
            let desc = self.dispatcher.get_attributes(&path)?;
            let ino = self.inodes.get_or_insert(&path);
            Ok(to_file_attr(ino, &desc))
        });
        match result {
            Ok(attr) => reply.entry(&self.config.entry_ttl, &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        trace!(inode = ino, nlookup, "forget");
        self.inodes.forget(ino, nlookup);
    }

    fn batch_forget(&mut self, _req: &Request<'_>, nodes: &[fuser::fuse_forget_one]) {
        trace!(count = nodes.len(), "batch_forget");
        for node in nodes {
            self.inodes.forget(node.nodeid, node.nlookup);
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        trace!(inode = ino, "getattr");
        let result = self
            .path_of(ino)
            .and_then(|path| Ok(self.dispatcher.get_attributes(&path)?));
        match result {
            Ok(desc) => reply.attr(&self.config.attr_ttl, &to_file_attr(ino, &desc)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, flags, "open");
        match self.open_file(ino, flags) {
            Ok(fh) => reply.opened(fh, self.open_flags()),
            Err(e) => {
                debug!(inode = ino, error = %e, "open failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!(inode = ino, fh, offset, size, "read");
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let result = self
            .handles
            .get(fh)
            .ok_or(FuseError::InvalidHandle(fh))
            .and_then(|handle| {
                let file = handle.as_file()?;
                Ok(self.dispatcher.read(file, offset, size as usize)?)
            });
        match result {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        trace!(inode = ino, fh, offset, len = data.len(), "write");
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let result = self
            .handles
            .get(fh)
            .ok_or(FuseError::InvalidHandle(fh))
            .and_then(|handle| {
                let file = handle.as_file()?;
                Ok(self.dispatcher.write(file, offset, data)?)
            });
        match result {
            Ok(written) => reply.written(u32::try_from(written).unwrap_or(u32::MAX)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        trace!(inode = ino, fh, "flush");
        if self.handles.contains(fh) {
            reply.ok();
        } else {
            reply.error(libc::EBADF);
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        trace!(inode = ino, fh, datasync, "fsync");
        let result = self
            .handles
            .get(fh)
            .ok_or(FuseError::InvalidHandle(fh))
            .and_then(|handle| Ok(handle.as_file()?.sync(datasync)?));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        trace!(inode = ino, fh, "release");
        match self.handles.remove(fh) {
            Some(FuseHandle::File(file)) => {
                self.dispatcher.release(file);
                reply.ok();
            }
            Some(FuseHandle::Directory(dir)) => {
                warn!(inode = ino, fh, "release on a directory handle");
                self.dispatcher.release_directory(dir);
                reply.ok();
            }
            None => reply.error(libc::EBADF),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, "opendir");
        let result = self
            .path_of(ino)
            .and_then(|path| Ok(self.dispatcher.open_directory(&path)?));
        match result {
            Ok(dir) => reply.opened(self.handles.insert(FuseHandle::Directory(dir)), 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!(inode = ino, fh, offset, "readdir");
        match self.read_dir(ino, fh, offset, &mut reply) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn releasedir(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        trace!(inode = ino, fh, "releasedir");
        match self.handles.remove(fh) {
            Some(FuseHandle::Directory(dir)) => {
                self.dispatcher.release_directory(dir);
                reply.ok();
            }
            Some(FuseHandle::File(file)) => {
                warn!(inode = ino, fh, "releasedir on a file handle");
                self.dispatcher.release(file);
                reply.ok();
            }
            None => reply.error(libc::EBADF),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        trace!(parent, ?name, mode, rdev, "mknod");
        let result = self.make_entry(parent, name, |fs, path| {
            fs.make_node(path, mode, u64::from(rdev))
        });
        match result {
            Ok(attr) => reply.entry(&self.config.entry_ttl, &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        trace!(parent, ?name, mode, "mkdir");
        let result = self.make_entry(parent, name, |fs, path| fs.make_directory(path, mode));
        match result {
            Ok(attr) => reply.entry(&self.config.entry_ttl, &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        trace!(parent, ?name, "unlink");
        match self.remove_entry(parent, name, Dispatcher::remove_node) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        trace!(parent, ?name, "rmdir");
        match self.remove_entry(parent, name, Dispatcher::remove_directory) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        match self.dispatcher.statfs() {
            Ok(st) => reply.statfs(
                st.blocks,
                st.blocks_free,
                st.blocks_available,
                st.files,
                st.files_free,
                st.block_size,
                st.name_max,
                st.fragment_size,
            ),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _name: &OsStr,
        _size: u32,
        reply: fuser::ReplyXattr,
    ) {
        reply.error(libc::ENOTSUP);
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(libc::ENOTSUP);
    }

    fn listxattr(&mut self, _req: &Request<'_>, _ino: u64, _size: u32, reply: fuser::ReplyXattr) {
        reply.error(libc::ENOTSUP);
    }

    fn removexattr(&mut self, _req: &Request<'_>, _ino: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(libc::ENOTSUP);
    }
}
