use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Metadata for one live workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// Opaque unique identifier, generated on creation.
    pub id: String,
    /// Absolute directory uniquely assigned to this workspace.
    pub root_path: PathBuf,
    /// Creation timestamp, Unix ms.
    pub created_at: u64,
    /// Time-to-live after `created_at`.
    pub timeout_ms: u64,
    /// Ports recorded for API compatibility; never actually bound.
    pub reserved_ports: Vec<u16>,
}

impl Workspace {
    /// Wall-clock deadline after which the workspace is torn down.
    #[must_use]
    pub fn expires_at(&self) -> u64 {
        self.created_at.saturating_add(self.timeout_ms)
    }
}

/// One path/content pair in a batch file read or write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
}

/// Options for [`crate::WorkspaceStore::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// TTL override; defaults to [`crate::DEFAULT_TIMEOUT_MS`].
    pub timeout_ms: Option<u64>,
    /// Ports to record on the workspace.
    pub ports: Vec<u16>,
}
