//! Batch file operations against a workspace root.
//!
//! Writes are best-effort: every file in the batch is attempted and
//! failures are aggregated. Reads and listings are total; per-entry
//! failures degrade to empty results and are logged, never raised.

use std::path::Path;

use tracing::warn;

use crate::{
    error::{Error, FileWriteFailure, Result},
    store::WorkspaceStore,
    types::FileEntry,
};

impl WorkspaceStore {
    /// Write each file under the workspace root, creating parent
    /// directories as needed and overwriting existing files.
    ///
    /// A failed write does not stop the batch; all failures are returned
    /// together as [`Error::FileWrites`].
    pub async fn write_files(&self, id: &str, files: &[FileEntry]) -> Result<()> {
        let workspace = self
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound { id: id.to_string() })?;

        let mut failures = Vec::new();
        for file in files {
            if let Err(e) = write_one(&workspace.root_path, file).await {
                warn!(id, path = %file.path, error = %e, "file write failed");
                failures.push(FileWriteFailure {
                    path: file.path.clone(),
                    message: e.to_string(),
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::FileWrites { failures })
        }
    }

    /// Read each path relative to the workspace root. A file that cannot
    /// be read yields empty content, keeping the batch total.
    pub async fn read_files(&self, id: &str, paths: &[String]) -> Result<Vec<FileEntry>> {
        let workspace = self
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound { id: id.to_string() })?;

        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let full_path = workspace.root_path.join(path);
            let content = match tokio::fs::read_to_string(&full_path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(id, path = %path, error = %e, "file read failed, returning empty content");
                    String::new()
                },
            };
            results.push(FileEntry {
                path: path.clone(),
                content,
            });
        }

        Ok(results)
    }

    /// List directory entries non-recursively, relative to the workspace
    /// root. Directories are suffixed with `/`. Listing errors degrade to
    /// an empty list.
    pub async fn list_files(&self, id: &str, dir_path: &str) -> Result<Vec<String>> {
        let workspace = self
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound { id: id.to_string() })?;

        let full_path = workspace.root_path.join(dir_path);
        let mut dir = match tokio::fs::read_dir(&full_path).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!(id, dir_path, error = %e, "failed to list workspace directory");
                return Ok(Vec::new());
            },
        };

        let mut entries = Vec::new();
        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let relative = if dir_path.is_empty() {
                        name
                    } else {
                        format!("{}/{name}", dir_path.trim_end_matches('/'))
                    };
                    let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
                    entries.push(if is_dir {
                        format!("{relative}/")
                    } else {
                        relative
                    });
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(id, dir_path, error = %e, "failed to read directory entry");
                    break;
                },
            }
        }

        Ok(entries)
    }
}

async fn write_one(root: &Path, file: &FileEntry) -> std::io::Result<()> {
    let full_path = root.join(&file.path);
    if let Some(parent) = full_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&full_path, &file.content).await
}
