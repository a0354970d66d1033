//! Per-mount session state.
//!
//! A [`SessionContext`] is built once before the filesystem is exposed and
//! is read-only afterwards. Every operation receives it by reference (in
//! practice through an `Arc` held by the dispatcher), so no locking is
//! needed to read it.

use crate::attr::AttrPolicy;
use crate::diag;
use crate::diagnostics::DiagnosticsSink;
use crate::error::{FsError, FsResult};
use crate::path::{PathResolver, ResolvedPath, VirtualPath};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Settings a session is created from.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory whose contents are exposed.
    pub backing_root: PathBuf,
    /// File that receives diagnostic records, if any.
    pub diagnostics_log: Option<PathBuf>,
    /// How attributes are reported.
    pub attr_policy: AttrPolicy,
}

impl SessionConfig {
    /// Creates a configuration for `backing_root` with stat-backed
    /// attributes and no diagnostics file.
    pub fn new(backing_root: impl Into<PathBuf>) -> Self {
        Self {
            backing_root: backing_root.into(),
            diagnostics_log: None,
            attr_policy: AttrPolicy::default(),
        }
    }

    /// Sets the diagnostics log file.
    #[must_use]
    pub fn diagnostics_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.diagnostics_log = Some(path.into());
        self
    }

    /// Sets the attribute policy.
    #[must_use]
    pub fn attr_policy(mut self, policy: AttrPolicy) -> Self {
        self.attr_policy = policy;
        self
    }
}

/// Immutable state shared by every operation of a mount.
#[derive(Debug)]
pub struct SessionContext {
    resolver: PathResolver,
    diagnostics: DiagnosticsSink,
    attr_policy: AttrPolicy,
    uid: u32,
    gid: u32,
}

impl SessionContext {
    /// Creates a session without touching the filesystem.
    ///
    /// Ownership defaults to the effective uid/gid of the process.
    pub fn new(backing_root: impl Into<PathBuf>, diagnostics: DiagnosticsSink) -> Self {
        Self {
            resolver: PathResolver::new(backing_root),
            diagnostics,
            attr_policy: AttrPolicy::default(),
            uid: nix::unistd::geteuid().as_raw(),
            gid: nix::unistd::getegid().as_raw(),
        }
    }

    /// Validates `config` and builds the session.
    ///
    /// The backing root is canonicalized and must be a directory. The
    /// diagnostics log, when configured, is opened for appending.
    pub fn from_config(config: &SessionConfig) -> FsResult<Self> {
        let root = fs::canonicalize(&config.backing_root)
            .map_err(|e| FsError::from_io(&config.backing_root, e))?;
        let meta = fs::metadata(&root).map_err(|e| FsError::from_io(&root, e))?;
        if !meta.is_dir() {
            return Err(FsError::Io {
                path: root,
                source: io::Error::from_raw_os_error(libc::ENOTDIR),
            });
        }

        let diagnostics = match &config.diagnostics_log {
            Some(log) => DiagnosticsSink::append_to(log).map_err(|e| FsError::from_io(log, e))?,
            None => DiagnosticsSink::disabled(),
        };

        info!(
            backing_root = %root.display(),
            attr_policy = ?config.attr_policy,
            diagnostics = diagnostics.is_enabled(),
            "session created"
        );
        Ok(Self::new(root, diagnostics).with_attr_policy(config.attr_policy))
    }

    /// Replaces the attribute policy.
    #[must_use]
    pub fn with_attr_policy(mut self, policy: AttrPolicy) -> Self {
        self.attr_policy = policy;
        self
    }

    /// Replaces the reported owner.
    #[must_use]
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    /// The backing root.
    pub fn backing_root(&self) -> &Path {
        self.resolver.backing_root()
    }

    /// The diagnostics sink.
    pub fn diagnostics(&self) -> &DiagnosticsSink {
        &self.diagnostics
    }

    /// The attribute policy.
    pub fn attr_policy(&self) -> AttrPolicy {
        self.attr_policy
    }

    /// Owner reported for synthesized attributes.
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// Group reported for synthesized attributes.
    pub fn gid(&self) -> u32 {
        self.gid
    }

    /// Resolves `path` onto the backing root and records the mapping.
    pub fn resolve(&self, path: &VirtualPath) -> FsResult<ResolvedPath> {
        let resolved = self.resolver.resolve(path)?;
        diag!(
            self.diagnostics,
            "`resolve` rootdir = \"{}\", path = \"{}\", fpath = \"{}\"",
            self.backing_root().display(),
            path,
            resolved
        );
        Ok(resolved)
    }
}

/// Returns true when either the real or the effective uid is 0.
pub fn is_superuser() -> bool {
    nix::unistd::getuid().is_root() || nix::unistd::geteuid().is_root()
}
