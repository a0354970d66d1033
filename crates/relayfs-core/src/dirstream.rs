//! Directory enumeration into size-bounded sinks.
//!
//! A [`DirectoryHandle`] wraps a native `readdir(3)` stream, so `.` and `..`
//! come back like any other entry and ordering is whatever the backing
//! filesystem produces. [`enumerate`] pushes entries into an [`EntrySink`]
//! until either the stream or the sink runs out.
//!
//! Enumeration resumes at the stream cursor. An entry the sink refuses is
//! parked in the handle and delivered first on the next call, so
//! re-invoking after [`FsError::OutOfResources`] never skips anything. A
//! caller that asks for an offset behind the cursor gets the stream
//! rewound and replayed up to that point.

use crate::attr::NodeKind;
use crate::error::{FsError, FsResult};
use crate::path::{ResolvedPath, VirtualPath};
use crate::session::SessionContext;
use nix::dir::{Dir, OwningIter, Type};
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use tracing::{debug, trace};

/// One entry read from a directory stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (a single component, or `.`/`..`).
    pub name: OsString,
    /// Inode number in the backing filesystem.
    pub ino: u64,
    /// Node type, when the backing filesystem reports it.
    pub kind: Option<NodeKind>,
}

impl DirEntry {
    /// Returns true for `.` and `..`.
    pub fn is_dot_or_dotdot(&self) -> bool {
        let name = self.name.as_bytes();
        name == b"." || name == b".."
    }

    fn from_nix(entry: &nix::dir::Entry) -> Self {
        Self {
            name: OsStr::from_bytes(entry.file_name().to_bytes()).to_os_string(),
            ino: entry.ino(),
            kind: entry.file_type().map(kind_from_type),
        }
    }
}

fn kind_from_type(t: Type) -> NodeKind {
    match t {
        Type::Directory => NodeKind::Directory,
        Type::File => NodeKind::RegularFile,
        Type::Symlink => NodeKind::Symlink,
        Type::Fifo => NodeKind::NamedPipe,
        Type::CharacterDevice => NodeKind::CharDevice,
        Type::BlockDevice => NodeKind::BlockDevice,
        Type::Socket => NodeKind::Socket,
    }
}

/// Bounded consumer of directory entries.
pub trait EntrySink {
    /// Offers one entry. Returns `false` when the sink has no room left;
    /// the entry is then not considered delivered.
    fn push(&mut self, entry: &DirEntry) -> bool;
}

impl EntrySink for Vec<DirEntry> {
    fn push(&mut self, entry: &DirEntry) -> bool {
        Vec::push(self, entry.clone());
        true
    }
}

/// Sink that accepts at most `capacity` entries.
#[derive(Debug, Clone, Default)]
pub struct BoundedSink {
    capacity: usize,
    entries: Vec<DirEntry>,
}

impl BoundedSink {
    /// Creates an empty sink with room for `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Entries accepted so far.
    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    /// Consumes the sink.
    pub fn into_entries(self) -> Vec<DirEntry> {
        self.entries
    }
}

impl EntrySink for BoundedSink {
    fn push(&mut self, entry: &DirEntry) -> bool {
        if self.entries.len() >= self.capacity {
            return false;
        }
        self.entries.push(entry.clone());
        true
    }
}

/// An open directory stream bound to one open-directory request.
pub struct DirectoryHandle {
    path: VirtualPath,
    resolved: ResolvedPath,
    stream: OwningIter,
    pending: Option<DirEntry>,
    delivered: u64,
}

impl DirectoryHandle {
    /// Opens the directory at `path`.
    pub fn open(ctx: &SessionContext, path: &VirtualPath) -> FsResult<Self> {
        let resolved = ctx.resolve(path)?;
        let stream = open_stream(&resolved)?;
        Ok(Self {
            path: path.clone(),
            resolved,
            stream,
            pending: None,
            delivered: 0,
        })
    }

    /// The directory this handle enumerates.
    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    /// Entries accepted by sinks since the stream was (re)opened.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Restarts the stream from the first entry.
    pub fn rewind(&mut self) -> FsResult<()> {
        self.stream = open_stream(&self.resolved)?;
        self.pending = None;
        self.delivered = 0;
        Ok(())
    }

    /// Rewinds, then skips the first `target` entries.
    fn seek_to(&mut self, target: u64) -> FsResult<()> {
        self.rewind()?;
        while self.delivered < target {
            if self.read_entry()?.is_none() {
                break;
            }
            self.delivered += 1;
        }
        Ok(())
    }

    fn read_entry(&mut self) -> FsResult<Option<DirEntry>> {
        if let Some(entry) = self.pending.take() {
            return Ok(Some(entry));
        }
        match self.stream.next() {
            None => Ok(None),
            Some(Ok(entry)) => Ok(Some(DirEntry::from_nix(&entry))),
            Some(Err(errno)) => Err(FsError::from_errno(&self.resolved, errno)),
        }
    }
}

impl fmt::Debug for DirectoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryHandle")
            .field("path", &self.path)
            .field("delivered", &self.delivered)
            .field("pending", &self.pending.is_some())
            .finish_non_exhaustive()
    }
}

fn open_stream(resolved: &ResolvedPath) -> FsResult<OwningIter> {
    Dir::open(
        resolved.as_path(),
        OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC,
        Mode::empty(),
    )
    .map(Dir::into_iter)
    .map_err(|errno| FsError::from_errno(resolved, errno))
}

/// Streams entries from `handle` into `sink`.
///
/// - `Ok(())`: the stream is exhausted and every entry was accepted.
/// - `Err(OutOfResources)`: the sink refused an entry; call again with a
///   fresh sink to continue.
/// - Any other error: the read failed, or a fresh stream ended before its
///   first entry (every directory has at least `.` and `..`).
///
/// `offset` is the number of entries the caller has consumed. `0` on a
/// handle that already delivered entries rewinds it; an offset behind the
/// cursor rewinds and replays up to that point. An offset ahead of the
/// cursor cannot be honored and is ignored.
pub fn enumerate<S>(handle: &mut DirectoryHandle, sink: &mut S, offset: i64) -> FsResult<()>
where
    S: EntrySink + ?Sized,
{
    trace!(path = %handle.path, offset, delivered = handle.delivered, "enumerate");

    let target = u64::try_from(offset).unwrap_or(0);
    if target < handle.delivered {
        debug!(path = %handle.path, offset, cursor = handle.delivered, "enumerate: seeking back");
        handle.seek_to(target)?;
    } else if target > handle.delivered {
        debug!(
            path = %handle.path,
            offset,
            cursor = handle.delivered,
            "enumerate: offset ahead of stream cursor, continuing from cursor"
        );
    }

    let Some(mut entry) = handle.read_entry()? else {
        if handle.delivered == 0 {
            return Err(FsError::TruncatedDirectory {
                path: handle.resolved.as_path().to_path_buf(),
            });
        }
        return Ok(());
    };

    let mut accepted = 0u64;
    loop {
        if !sink.push(&entry) {
            debug!(path = %handle.path, accepted, "enumerate: entry sink full");
            handle.pending = Some(entry);
            return Err(FsError::OutOfResources { delivered: accepted });
        }
        accepted += 1;
        handle.delivered += 1;

        match handle.read_entry()? {
            Some(next) => entry = next,
            None => return Ok(()),
        }
    }
}
