//! Command registry: submission, observation, kill, and garbage collection.

use std::{
    collections::HashMap,
    pin::Pin,
    process::Stdio,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {
    futures::Stream,
    tokio::{
        sync::{Mutex, Notify, RwLock, mpsc, oneshot},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

use vibebox_workspaces::WorkspaceStore;

use crate::{
    error::{Error, Result},
    spawn::{self, ProcessEvent},
    types::{CommandInfo, CommandStatus, LogLine, LogStream, SubmitOptions, WaitResult},
};

/// Retention window for finished commands, so late-polling callers have a
/// bounded window to fetch final state.
pub const GRACE_PERIOD: Duration = Duration::from_secs(300);

/// Fixed interval used by `wait` and `stream` to re-check command state.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Collector poll interval when no command has a pending deadline.
const IDLE_POLL_MS: u64 = 60_000;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

struct CommandState {
    info: CommandInfo,
    /// Append-only; written exclusively by the command's event consumer.
    logs: Vec<LogLine>,
    /// Present while the process is live and unkilled.
    kill: Option<oneshot::Sender<()>>,
    finished_at: Option<u64>,
}

/// Engine owning all command records and live process handles.
///
/// Commands run against workspaces from the injected [`WorkspaceStore`];
/// each holds only a weak (id) reference, so a workspace can expire while
/// its commands are still running. Construct a fresh engine per test.
pub struct CommandEngine {
    workspaces: Arc<WorkspaceStore>,
    commands: RwLock<HashMap<String, CommandState>>,
    grace_period: Duration,
    poll_interval: Duration,
    collector_handle: Mutex<Option<JoinHandle<()>>>,
    wake_notify: Arc<Notify>,
    running: RwLock<bool>,
}

impl CommandEngine {
    pub fn new(workspaces: Arc<WorkspaceStore>) -> Arc<Self> {
        Self::with_config(workspaces, GRACE_PERIOD, POLL_INTERVAL)
    }

    /// Create an engine with explicit grace period and poll interval
    /// (shortened in tests).
    pub fn with_config(
        workspaces: Arc<WorkspaceStore>,
        grace_period: Duration,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            workspaces,
            commands: RwLock::new(HashMap::new()),
            grace_period,
            poll_interval,
            collector_handle: Mutex::new(None),
            wake_notify: Arc::new(Notify::new()),
            running: RwLock::new(false),
        })
    }

    /// Submit a command against a live workspace and return immediately.
    ///
    /// The process is spawned with its working directory and `HOME` set to
    /// the workspace root, inheriting the rest of the host environment.
    /// Spawn failures are absorbed into the command's stderr log (exit
    /// code 1, finished), never raised.
    pub async fn submit(self: &Arc<Self>, options: SubmitOptions) -> Result<CommandInfo> {
        let workspace =
            self.workspaces
                .get(&options.workspace_id)
                .await
                .ok_or_else(|| Error::WorkspaceNotFound {
                    id: options.workspace_id.clone(),
                })?;

        let id = uuid::Uuid::new_v4().to_string();
        let info = CommandInfo {
            id: id.clone(),
            workspace_id: options.workspace_id,
            program: options.program.clone(),
            args: options.args.clone(),
            elevated: options.elevated,
            started_at: now_ms(),
            exit_code: None,
            finished: false,
        };

        self.commands.write().await.insert(
            id.clone(),
            CommandState {
                info: info.clone(),
                logs: Vec::new(),
                kill: None,
                finished_at: None,
            },
        );

        let (program, args) = spawn::spawn_target(&options.program, &options.args, options.elevated);
        info!(
            id = %id,
            program = %program,
            workspace = %workspace.id,
            elevated = options.elevated,
            "spawning command"
        );

        let mut command = tokio::process::Command::new(&program);
        command
            .args(&args)
            .current_dir(&workspace.root_path)
            .env("HOME", &workspace.root_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match spawn::spawn_supervised(command) {
            Ok(spawned) => {
                if let Some(state) = self.commands.write().await.get_mut(&id) {
                    state.kill = Some(spawned.kill);
                }

                let engine = Arc::clone(self);
                let command_id = id.clone();
                tokio::spawn(async move {
                    engine.consume_events(command_id, spawned.events).await;
                });
            },
            Err(e) => {
                warn!(id = %id, error = %e, "failed to spawn command");
                self.record_spawn_failure(&id, &e).await;
            },
        }

        let snapshot = self.commands.read().await.get(&id).map(|s| s.info.clone());
        Ok(snapshot.unwrap_or(info))
    }

    /// Pure status lookup.
    pub async fn status(&self, id: &str) -> Result<CommandStatus> {
        let commands = self.commands.read().await;
        let state = commands
            .get(id)
            .ok_or_else(|| Error::NotFound { id: id.to_string() })?;
        Ok(CommandStatus {
            finished: state.info.finished,
            exit_code: state.info.exit_code,
        })
    }

    /// Full command record at call time.
    pub async fn command(&self, id: &str) -> Result<CommandInfo> {
        let commands = self.commands.read().await;
        commands
            .get(id)
            .map(|s| s.info.clone())
            .ok_or_else(|| Error::NotFound { id: id.to_string() })
    }

    /// Snapshot of the accumulated log. Complete once the command is
    /// finished; may be a prefix while it is still running.
    pub async fn logs(&self, id: &str) -> Result<Vec<LogLine>> {
        let commands = self.commands.read().await;
        commands
            .get(id)
            .map(|s| s.logs.clone())
            .ok_or_else(|| Error::NotFound { id: id.to_string() })
    }

    /// Live log feed: yields the backlog, then polls for appended lines,
    /// terminating once the command is finished and drained. A fresh call
    /// replays from the head.
    pub async fn stream(
        self: &Arc<Self>,
        id: &str,
    ) -> Result<Pin<Box<dyn Stream<Item = LogLine> + Send>>> {
        if !self.commands.read().await.contains_key(id) {
            return Err(Error::NotFound { id: id.to_string() });
        }

        let engine = Arc::clone(self);
        let id = id.to_string();
        let poll_interval = self.poll_interval;

        Ok(Box::pin(async_stream::stream! {
            let mut cursor = 0usize;
            loop {
                let (new_lines, finished) = {
                    let commands = engine.commands.read().await;
                    match commands.get(&id) {
                        Some(state) => (state.logs[cursor..].to_vec(), state.info.finished),
                        // Garbage-collected mid-stream: nothing more to yield.
                        None => (Vec::new(), true),
                    }
                };
                cursor += new_lines.len();
                for line in new_lines {
                    yield line;
                }
                if finished {
                    break;
                }
                tokio::time::sleep(poll_interval).await;
            }
        }))
    }

    /// Poll until the command finishes, then return its exit code and the
    /// concatenated stdout/stderr text. Idempotent after completion.
    pub async fn wait(&self, id: &str) -> Result<WaitResult> {
        loop {
            let status = self.status(id).await?;
            if status.finished {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        let commands = self.commands.read().await;
        let state = commands
            .get(id)
            .ok_or_else(|| Error::NotFound { id: id.to_string() })?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        for line in &state.logs {
            match line.stream {
                LogStream::Stdout => stdout.push_str(&line.data),
                LogStream::Stderr => stderr.push_str(&line.data),
            }
        }

        Ok(WaitResult {
            exit_code: state.info.exit_code.unwrap_or(0),
            stdout,
            stderr,
        })
    }

    /// Request termination of a live process. Advisory: completion is
    /// still observed through the normal exit notification. Returns
    /// whether a signal was actually sent.
    pub async fn kill(&self, id: &str) -> bool {
        let mut commands = self.commands.write().await;
        let Some(state) = commands.get_mut(id) else {
            return false;
        };
        match state.kill.take() {
            Some(kill) => {
                debug!(id, "kill requested");
                kill.send(()).is_ok()
            },
            None => false,
        }
    }

    /// Start the garbage collector for finished commands.
    pub async fn start(self: &Arc<Self>) {
        *self.running.write().await = true;

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            engine.collect_loop().await;
        });

        *self.collector_handle.lock().await = Some(handle);
    }

    /// Stop the garbage collector.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.wake_notify.notify_one();

        let mut handle = self.collector_handle.lock().await;
        if let Some(h) = handle.take() {
            h.abort();
        }
        debug!("command collector stopped");
    }

    // ── Internal ────────────────────────────────────────────────────────

    /// Single consumer of one command's event channel; the only writer of
    /// its log buffer and terminal state.
    async fn consume_events(
        self: Arc<Self>,
        id: String,
        mut events: mpsc::UnboundedReceiver<ProcessEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                ProcessEvent::Output { stream, chunk } => {
                    let mut commands = self.commands.write().await;
                    if let Some(state) = commands.get_mut(&id) {
                        state.logs.push(LogLine {
                            data: chunk,
                            stream,
                            timestamp: now_ms(),
                        });
                    }
                },
                ProcessEvent::Exited { exit_code } => {
                    {
                        let mut commands = self.commands.write().await;
                        if let Some(state) = commands.get_mut(&id) {
                            state.info.exit_code = Some(exit_code);
                            state.info.finished = true;
                            state.finished_at = Some(now_ms());
                            state.kill = None;
                        }
                    }
                    debug!(id = %id, exit_code, "command finished");
                    self.wake_notify.notify_one();
                },
            }
        }
    }

    async fn record_spawn_failure(&self, id: &str, error: &std::io::Error) {
        let mut commands = self.commands.write().await;
        if let Some(state) = commands.get_mut(id) {
            state.logs.push(LogLine {
                data: format!("Error: {error}\n"),
                stream: LogStream::Stderr,
                timestamp: now_ms(),
            });
            state.info.exit_code = Some(1);
            state.info.finished = true;
            state.finished_at = Some(now_ms());
        }
        drop(commands);
        self.wake_notify.notify_one();
    }

    async fn collect_loop(self: &Arc<Self>) {
        loop {
            if !*self.running.read().await {
                break;
            }

            let sleep_ms = self.ms_until_next_collection().await;

            if sleep_ms > 0 {
                let notify = Arc::clone(&self.wake_notify);
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {},
                    () = notify.notified() => {
                        continue;
                    },
                }
            }

            if !*self.running.read().await {
                break;
            }

            self.collect_finished().await;
        }
    }

    async fn ms_until_next_collection(&self) -> u64 {
        let commands = self.commands.read().await;
        let now = now_ms();
        let grace_ms = self.grace_period.as_millis() as u64;
        commands
            .values()
            .filter_map(|s| s.finished_at)
            .map(|t| t.saturating_add(grace_ms).saturating_sub(now))
            .min()
            .unwrap_or(IDLE_POLL_MS)
    }

    async fn collect_finished(&self) {
        let now = now_ms();
        let grace_ms = self.grace_period.as_millis() as u64;
        let mut commands = self.commands.write().await;
        commands.retain(|id, state| {
            let expired = state
                .finished_at
                .is_some_and(|t| t.saturating_add(grace_ms) <= now);
            if expired {
                debug!(id = %id, "collecting finished command");
            }
            !expired
        });
    }
}
