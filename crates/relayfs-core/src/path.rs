//! Virtual paths and their resolution onto the backing root.
//!
//! A [`VirtualPath`] is what callers of the mounted tree see: a slash-rooted
//! byte string. [`PathResolver::resolve`] turns it into a [`ResolvedPath`] by
//! plain concatenation with the backing root. Nothing is canonicalized and
//! no symlinks are followed; the only safety net is validation at parse time
//! (no `..` segments, no NUL bytes) and the `PATH_MAX` bound at join time.

use crate::error::{FsError, FsResult};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Maximum resolved path length in bytes, including the terminating NUL.
#[allow(clippy::cast_sign_loss)]
pub const MAX_PATH_LEN: usize = libc::PATH_MAX as usize;

/// A validated path inside the exposed tree, rooted at `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualPath(OsString);

impl VirtualPath {
    /// The root of the exposed tree.
    pub fn root() -> Self {
        Self(OsString::from("/"))
    }

    /// Validates a caller-supplied path.
    ///
    /// Rejects empty paths, paths that do not start with `/`, embedded NUL
    /// bytes and any `..` segment. Other segments are kept verbatim.
    pub fn parse(raw: impl AsRef<OsStr>) -> FsResult<Self> {
        let raw = raw.as_ref();
        let bytes = raw.as_bytes();
        let invalid = |reason| FsError::InvalidPath {
            path: raw.to_string_lossy().into_owned(),
            reason,
        };

        if bytes.first() != Some(&b'/') {
            return Err(invalid("path must start with '/'"));
        }
        if bytes.contains(&0) {
            return Err(invalid("embedded NUL byte"));
        }
        if bytes.split(|b| *b == b'/').any(|segment| segment == b"..") {
            return Err(invalid("parent-directory segment"));
        }
        Ok(Self(raw.to_os_string()))
    }

    /// Returns true for `/`.
    pub fn is_root(&self) -> bool {
        self.0.as_bytes() == b"/"
    }

    /// Appends a single component.
    pub fn join(&self, name: impl AsRef<OsStr>) -> FsResult<Self> {
        let name = name.as_ref().as_bytes();
        let invalid = |reason| FsError::InvalidPath {
            path: String::from_utf8_lossy(name).into_owned(),
            reason,
        };

        if name.is_empty() {
            return Err(invalid("empty component"));
        }
        if name == b"." || name == b".." {
            return Err(invalid("relative component"));
        }
        if name.contains(&b'/') || name.contains(&0) {
            return Err(invalid("component contains '/' or NUL"));
        }

        let mut joined = self.0.as_bytes().to_vec();
        if !joined.ends_with(b"/") {
            joined.push(b'/');
        }
        joined.extend_from_slice(name);
        Ok(Self(OsString::from_vec(joined)))
    }

    /// Returns the parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let bytes = self.trimmed();
        let cut = bytes.iter().rposition(|b| *b == b'/')?;
        if cut == 0 {
            return Some(Self::root());
        }
        Some(Self(OsString::from_vec(bytes[..cut].to_vec())))
    }

    /// Returns the final component, or `None` for the root.
    pub fn file_name(&self) -> Option<&OsStr> {
        if self.is_root() {
            return None;
        }
        let bytes = self.trimmed();
        let start = bytes.iter().rposition(|b| *b == b'/').map_or(0, |i| i + 1);
        Some(OsStr::from_bytes(&bytes[start..]))
    }

    /// Returns the raw path.
    pub fn as_os_str(&self) -> &OsStr {
        &self.0
    }

    /// Length of the path in bytes.
    pub fn byte_len(&self) -> usize {
        self.0.len()
    }

    fn trimmed(&self) -> &[u8] {
        let bytes = self.0.as_bytes();
        let end = bytes.iter().rposition(|b| *b != b'/').map_or(1, |i| i + 1);
        &bytes[..end]
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_string_lossy())
    }
}

impl AsRef<OsStr> for VirtualPath {
    fn as_ref(&self) -> &OsStr {
        &self.0
    }
}

/// A virtual path joined onto the backing root.
///
/// Recomputed for every operation and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    /// Returns the real path.
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Consumes the wrapper.
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

/// Joins virtual paths onto a fixed backing root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    backing_root: PathBuf,
}

impl PathResolver {
    /// Creates a resolver for `backing_root`.
    ///
    /// The root is used as given; callers canonicalize it beforehand.
    pub fn new(backing_root: impl Into<PathBuf>) -> Self {
        Self {
            backing_root: backing_root.into(),
        }
    }

    /// The backing root this resolver joins onto.
    pub fn backing_root(&self) -> &Path {
        &self.backing_root
    }

    /// Joins `path` onto the backing root.
    ///
    /// Fails with [`FsError::PathTooLong`] when the result plus its NUL
    /// terminator would not fit in [`MAX_PATH_LEN`].
    pub fn resolve(&self, path: &VirtualPath) -> FsResult<ResolvedPath> {
        let prefix = self.prefix();
        let len = prefix.len() + path.byte_len();
        if len >= MAX_PATH_LEN {
            return Err(FsError::PathTooLong {
                len,
                max: MAX_PATH_LEN - 1,
            });
        }

        let mut joined = Vec::with_capacity(len);
        joined.extend_from_slice(prefix);
        joined.extend_from_slice(path.as_os_str().as_bytes());
        let resolved = ResolvedPath(PathBuf::from(OsString::from_vec(joined)));

        trace!(
            root = %self.backing_root.display(),
            virtual_path = %path,
            resolved = %resolved,
            "resolve"
        );
        Ok(resolved)
    }

    // Trailing slashes are dropped so "/" + "/x" yields "/x", not "//x".
    fn prefix(&self) -> &[u8] {
        let bytes = self.backing_root.as_os_str().as_bytes();
        let end = bytes.iter().rposition(|b| *b != b'/').map_or(0, |i| i + 1);
        &bytes[..end]
    }
}
