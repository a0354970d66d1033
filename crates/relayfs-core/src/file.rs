//! Open files and positional I/O.

use crate::error::{FsError, FsResult};
use crate::path::{ResolvedPath, VirtualPath};
use crate::session::SessionContext;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use tracing::{debug, trace};

/// A file opened on behalf of one caller.
///
/// Owned by whoever opened it; closing is dropping.
#[derive(Debug)]
pub struct OpenFile {
    path: VirtualPath,
    resolved: ResolvedPath,
    file: File,
    flags: OFlag,
}

impl OpenFile {
    /// Opens `path` with the caller's `open(2)` flags.
    ///
    /// `O_CLOEXEC` is always added. `O_CREAT` and `O_EXCL` are dropped:
    /// creation goes through [`crate::node::make_node`].
    pub fn open(ctx: &SessionContext, path: &VirtualPath, flags: i32) -> FsResult<Self> {
        let resolved = ctx.resolve(path)?;
        let flags = (OFlag::from_bits_truncate(flags) - (OFlag::O_CREAT | OFlag::O_EXCL))
            | OFlag::O_CLOEXEC;
        debug!(path = %path, ?flags, "open");

        let fd = nix::fcntl::open(resolved.as_path(), flags, Mode::empty())
            .map_err(|errno| FsError::from_errno(&resolved, errno))?;
        Ok(Self {
            path: path.clone(),
            resolved,
            file: File::from(fd),
            flags,
        })
    }

    /// Path this file was opened at.
    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    /// Flags the file was opened with.
    pub fn flags(&self) -> OFlag {
        self.flags
    }

    /// Reads up to `size` bytes at `offset`. Shorter only at end of file.
    pub fn read_at(&self, offset: u64, size: usize) -> FsResult<Vec<u8>> {
        let mut buf = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            match self.file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(FsError::from_io(&self.resolved, e)),
            }
        }
        buf.truncate(filled);
        trace!(path = %self.path, offset, requested = size, read = filled, "read_at");
        Ok(buf)
    }

    /// Writes all of `data` at `offset` and returns the byte count.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> FsResult<usize> {
        self.file
            .write_all_at(data, offset)
            .map_err(|e| FsError::from_io(&self.resolved, e))?;
        trace!(path = %self.path, offset, written = data.len(), "write_at");
        Ok(data.len())
    }

    /// Flushes file data (and metadata unless `datasync`) to the backing
    /// filesystem.
    pub fn sync(&self, datasync: bool) -> FsResult<()> {
        let result = if datasync {
            self.file.sync_data()
        } else {
            self.file.sync_all()
        };
        result.map_err(|e| FsError::from_io(&self.resolved, e))
    }
}
