//! Workspace registry: isolated working directories for sandboxed execution.
//!
//! A workspace is a directory under a common base dir plus in-memory
//! metadata. Workspaces are created on demand, expire after a TTL, and are
//! the filesystem root every command in `vibebox-engine` runs against.
//! Isolation is directory-level only: this is a local development stand-in
//! for a remote sandbox provider, not a security boundary.

pub mod error;
pub mod files;
pub mod store;
pub mod types;

pub use {
    error::{Error, FileWriteFailure, Result},
    store::{DEFAULT_TIMEOUT_MS, WorkspaceStore, default_base_dir},
    types::{CreateOptions, FileEntry, Workspace},
};
