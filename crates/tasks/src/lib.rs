//! Task-queue-facing units of work over the workspace registry and the
//! command engine.
//!
//! Each operation here maps to one independently retryable task on the
//! queue platform: create workspace, write files, read files, execute a
//! command (optionally waiting), and the command lookups. Transient
//! failures are retried with bounded exponential backoff; unknown-id
//! failures are permanent and surface immediately. Write failures are
//! reported as a structured rich error instead of raising, so the
//! orchestration layer can show partial results.

pub mod ops;
pub mod retry;
pub mod rich_error;

pub use {
    ops::{
        CreateWorkspacePayload, ExecutePayload, ExecuteResult, ReadFilesPayload, ReadFilesResult,
        TaskRunner, WorkspaceCreated, WriteFilesPayload, WriteFilesResult,
    },
    retry::{FailureKind, RetryPolicy, run_with_retry},
    rich_error::RichError,
};
