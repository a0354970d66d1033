//! Passthrough filesystem core.
//!
//! Every operation on the exposed tree is re-executed against a backing
//! directory. A caller-visible path like `/docs/a.txt` is joined onto the
//! backing root and the matching system call runs on the result. There is
//! no caching layer and no path translation beyond that join.
//!
//! # Components
//!
//! - [`path`] - [`VirtualPath`] validation and [`PathResolver`]
//! - [`session`] - [`SessionContext`], the immutable per-mount state
//! - [`attr`] - attribute reporting under an [`AttrPolicy`]
//! - [`dirstream`] - directory streams feeding a bounded [`EntrySink`]
//! - [`node`] - node creation and removal
//! - [`file`] - [`OpenFile`] with positional I/O
//! - [`dispatch`] - the [`Dispatcher`] operation table
//! - [`diagnostics`] - the timestamped per-call log side channel
//!
//! # Example
//!
//! ```
//! use relayfs_core::{DiagnosticsSink, Dispatcher, SessionContext, VirtualPath};
//! use std::sync::Arc;
//!
//! let dir = tempfile::tempdir()?;
//! let ctx = Arc::new(SessionContext::new(dir.path(), DiagnosticsSink::disabled()));
//! let fs = Dispatcher::new(ctx);
//!
//! let path = VirtualPath::parse("/notes")?;
//! fs.make_directory(&path, 0o755)?;
//! assert!(dir.path().join("notes").is_dir());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod attr;
pub mod diagnostics;
pub mod dirstream;
pub mod dispatch;
pub mod error;
pub mod file;
pub mod node;
pub mod path;
pub mod session;

pub use attr::{AttrPolicy, NodeDescriptor, NodeKind};
pub use diagnostics::DiagnosticsSink;
pub use dirstream::{BoundedSink, DirEntry, DirectoryHandle, EntrySink};
pub use dispatch::{ConnectionTuning, Dispatcher, FsStats, Operation, status};
pub use error::{ErrorKind, FsError, FsResult};
pub use file::OpenFile;
pub use path::{MAX_PATH_LEN, PathResolver, ResolvedPath, VirtualPath};
pub use session::{SessionConfig, SessionContext, is_superuser};
