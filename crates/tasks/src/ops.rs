//! The task bodies: one function per queue-platform unit of work.

use std::{path::PathBuf, sync::Arc};

use {
    serde::{Deserialize, Serialize},
    tracing::info,
};

use {
    vibebox_engine::{CommandEngine, CommandStatus, LogLine, SubmitOptions},
    vibebox_workspaces::{CreateOptions, FileEntry, WorkspaceStore},
};

use crate::{
    retry::{FailureKind, RetryPolicy, run_with_retry},
    rich_error::RichError,
};

/// Payload for the create-workspace task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateWorkspacePayload {
    pub timeout_ms: Option<u64>,
    pub ports: Vec<u16>,
}

/// Result of the create-workspace task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceCreated {
    pub workspace_id: String,
    pub root_path: PathBuf,
    pub created_at: u64,
    pub timeout_ms: u64,
    pub ports: Vec<u16>,
}

/// Payload for the write-files task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteFilesPayload {
    pub workspace_id: String,
    pub files: Vec<FileEntry>,
}

/// Result of the write-files task. Failures are carried as a rich error
/// rather than raised, so the caller can render the attempted paths as
/// errored alongside a short diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct WriteFilesResult {
    pub success: bool,
    pub files_written: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RichError>,
}

/// Payload for the read-files task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFilesPayload {
    pub workspace_id: String,
    pub paths: Vec<String>,
}

/// Result of the read-files task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFilesResult {
    pub files: Vec<FileEntry>,
}

/// Payload for the execute-command task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutePayload {
    pub workspace_id: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub elevated: bool,
    /// Block until the command finishes and include its output.
    #[serde(default)]
    pub wait: bool,
}

/// Result of the execute-command task. `exit_code`/`stdout`/`stderr` are
/// present only when the payload asked to wait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub command_id: String,
    pub started: bool,
    pub finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

/// Runs the queue platform's units of work against an injected registry
/// and engine, applying the bounded retry policy to transient failures.
pub struct TaskRunner {
    workspaces: Arc<WorkspaceStore>,
    engine: Arc<CommandEngine>,
    policy: RetryPolicy,
}

impl TaskRunner {
    pub fn new(workspaces: Arc<WorkspaceStore>, engine: Arc<CommandEngine>) -> Self {
        Self {
            workspaces,
            engine,
            policy: RetryPolicy::default(),
        }
    }

    /// Override the retry policy (shortened in tests).
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Create a new workspace.
    pub async fn create_workspace(
        &self,
        payload: CreateWorkspacePayload,
    ) -> vibebox_workspaces::Result<WorkspaceCreated> {
        let workspace = run_with_retry(
            &self.policy,
            || {
                self.workspaces.create(CreateOptions {
                    timeout_ms: payload.timeout_ms,
                    ports: payload.ports.clone(),
                })
            },
            classify_workspace_error,
        )
        .await?;

        Ok(WorkspaceCreated {
            workspace_id: workspace.id,
            root_path: workspace.root_path,
            created_at: workspace.created_at,
            timeout_ms: workspace.timeout_ms,
            ports: workspace.reserved_ports,
        })
    }

    /// Write files into a workspace. Never raises: failures come back as
    /// a rich error on the result.
    pub async fn write_files(&self, payload: WriteFilesPayload) -> WriteFilesResult {
        match self
            .workspaces
            .write_files(&payload.workspace_id, &payload.files)
            .await
        {
            Ok(()) => {
                info!(
                    workspace = %payload.workspace_id,
                    count = payload.files.len(),
                    "files written"
                );
                WriteFilesResult {
                    success: true,
                    files_written: payload.files.len(),
                    error: None,
                }
            },
            Err(e) => {
                let paths: Vec<&str> = payload.files.iter().map(|f| f.path.as_str()).collect();
                let rich = RichError::new(
                    "write files to workspace",
                    serde_json::json!({
                        "workspace_id": payload.workspace_id,
                        "paths": paths,
                    }),
                    &e,
                );
                WriteFilesResult {
                    success: false,
                    files_written: 0,
                    error: Some(rich),
                }
            },
        }
    }

    /// Read files from a workspace.
    pub async fn read_files(
        &self,
        payload: ReadFilesPayload,
    ) -> vibebox_workspaces::Result<ReadFilesResult> {
        let files = run_with_retry(
            &self.policy,
            || self.workspaces.read_files(&payload.workspace_id, &payload.paths),
            classify_workspace_error,
        )
        .await?;
        Ok(ReadFilesResult { files })
    }

    /// Submit a command, optionally waiting for completion.
    pub async fn execute_command(
        &self,
        payload: ExecutePayload,
    ) -> vibebox_engine::Result<ExecuteResult> {
        let options = SubmitOptions {
            workspace_id: payload.workspace_id,
            program: payload.program,
            args: payload.args,
            elevated: payload.elevated,
        };
        let command = self.engine.submit(options).await?;

        if payload.wait {
            let result = self.engine.wait(&command.id).await?;
            return Ok(ExecuteResult {
                command_id: command.id,
                started: true,
                finished: true,
                exit_code: Some(result.exit_code),
                stdout: Some(result.stdout),
                stderr: Some(result.stderr),
            });
        }

        Ok(ExecuteResult {
            command_id: command.id,
            started: true,
            finished: command.finished,
            exit_code: None,
            stdout: None,
            stderr: None,
        })
    }

    /// Look up a command's terminal status.
    pub async fn command_status(&self, command_id: &str) -> vibebox_engine::Result<CommandStatus> {
        self.engine.status(command_id).await
    }

    /// Fetch a command's accumulated log snapshot.
    pub async fn command_logs(&self, command_id: &str) -> vibebox_engine::Result<Vec<LogLine>> {
        self.engine.logs(command_id).await
    }

    /// Block until a command finishes and return its output.
    pub async fn wait_for_command(
        &self,
        command_id: &str,
    ) -> vibebox_engine::Result<vibebox_engine::WaitResult> {
        self.engine.wait(command_id).await
    }
}

/// Unknown ids are permanent; everything else (disk, IO) may be transient.
fn classify_workspace_error(error: &vibebox_workspaces::Error) -> FailureKind {
    if error.is_not_found() {
        FailureKind::Permanent
    } else {
        FailureKind::Transient
    }
}
