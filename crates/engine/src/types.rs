use serde::{Deserialize, Serialize};

/// Which output pipe a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// One timestamped chunk of process output.
///
/// `data` is the chunk exactly as read from the pipe (newlines included),
/// so concatenating a stream's chunks reproduces its byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub data: String,
    pub stream: LogStream,
    /// Arrival timestamp, Unix ms.
    pub timestamp: u64,
}

/// Public record for one submitted command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInfo {
    pub id: String,
    /// Weak reference: the workspace may be torn down while the command
    /// is still running.
    pub workspace_id: String,
    pub program: String,
    pub args: Vec<String>,
    pub elevated: bool,
    /// Submission timestamp, Unix ms.
    pub started_at: u64,
    /// Absent while the process is running.
    pub exit_code: Option<i32>,
    pub finished: bool,
}

/// Result of a status lookup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CommandStatus {
    pub finished: bool,
    pub exit_code: Option<i32>,
}

/// Result of waiting for a command to finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitResult {
    pub exit_code: i32,
    /// All stdout chunks concatenated in emission order.
    pub stdout: String,
    /// All stderr chunks concatenated in emission order.
    pub stderr: String,
}

/// Options for [`crate::CommandEngine::submit`].
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub workspace_id: String,
    pub program: String,
    pub args: Vec<String>,
    /// Re-invoke through `sudo` with the program prepended to the args.
    pub elevated: bool,
}

impl SubmitOptions {
    pub fn new(workspace_id: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            program: program.into(),
            args: Vec::new(),
            elevated: false,
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}
