//! FUSE bridge for relayfs.
//!
//! Mounts a backing directory at a mount point and re-executes every
//! request against it. The path-based operations live in `relayfs-core`;
//! this crate adds inode numbering, the file handle table and the fuser
//! glue.
//!
//! # Usage
//!
//! ```ignore
//! use relayfs_core::{SessionConfig, SessionContext};
//! use relayfs_fuse::{RelayFS, mount};
//! use std::sync::Arc;
//!
//! let session = SessionContext::from_config(&SessionConfig::new("/srv/store"))?;
//! let handle = mount(RelayFS::new(Arc::new(session)), "/mnt/relay".as_ref())?;
//! // ...
//! handle.unmount();
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod handles;
pub mod inode;

pub use backend::{FuseMountHandle, mount};
pub use config::MountConfig;
pub use error::{FuseError, FuseResult};
pub use filesystem::RelayFS;
pub use handles::{FuseHandle, FuseHandleTable};
pub use inode::{InodeEntry, InodeTable, ROOT_INODE};
