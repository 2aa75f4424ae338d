use std::path::PathBuf;

use thiserror::Error;

/// A single failed write inside a batch file-write call.
#[derive(Debug, Clone)]
pub struct FileWriteFailure {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("workspace not found: {id}")]
    NotFound { id: String },

    #[error("failed to provision workspace directory {}: {source}", .path.display())]
    Provisioning {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Aggregated per-file failures from a batch write. The remaining files
    /// in the batch were still attempted.
    #[error("failed to write {} file(s): {}", .failures.len(), summarize(.failures))]
    FileWrites { failures: Vec<FileWriteFailure> },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Lookup failures are permanent: the id never existed or was already
    /// torn down. Callers must not retry these.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

fn summarize(failures: &[FileWriteFailure]) -> String {
    failures
        .iter()
        .map(|f| f.path.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;
