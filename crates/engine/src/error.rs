use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("workspace not found: {id}")]
    WorkspaceNotFound { id: String },

    #[error("command not found: {id}")]
    NotFound { id: String },
}

impl Error {
    /// Lookup failures are permanent: the id never existed or was already
    /// garbage-collected. Callers must not retry these.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::WorkspaceNotFound { .. } | Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
