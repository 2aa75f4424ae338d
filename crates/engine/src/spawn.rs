//! Process spawning and supervision.
//!
//! Each spawned command gets its own event channel: two pump tasks forward
//! raw output chunks from the stdout/stderr pipes, and a supervisor task
//! sends the exit event after both pipes have drained. The engine's single
//! consumer of that channel is the only writer of the command's log buffer,
//! so observers never race with output capture.

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use tracing::{debug, info, warn};

use crate::types::LogStream;

/// Package-manager aliases substituted when the requested binary is not
/// on PATH. Keeps agent-generated `pnpm` invocations working on hosts
/// that only have `npm`.
const PACKAGE_MANAGER_FALLBACKS: &[(&str, &str)] = &[("pnpm", "npm")];

const PIPE_CHUNK_BYTES: usize = 8192;

/// The substitute for `program` when it is a known package-manager alias.
pub(crate) fn fallback_for(program: &str) -> Option<&'static str> {
    PACKAGE_MANAGER_FALLBACKS
        .iter()
        .find(|(alias, _)| *alias == program)
        .map(|(_, substitute)| *substitute)
}

/// Resolve the program that is actually spawned. A known alias that is
/// unavailable on the host is substituted and the substitution logged.
pub(crate) fn resolve_program(program: &str) -> String {
    if let Some(substitute) = fallback_for(program)
        && which::which(program).is_err()
    {
        info!(requested = program, substitute, "program not on PATH, substituting");
        return substitute.to_string();
    }
    program.to_string()
}

/// Compute the `(program, args)` pair to spawn, applying alias resolution
/// and elevation wrapping.
pub(crate) fn spawn_target(program: &str, args: &[String], elevated: bool) -> (String, Vec<String>) {
    let resolved = resolve_program(program);
    if elevated {
        let mut wrapped = Vec::with_capacity(args.len() + 1);
        wrapped.push(resolved);
        wrapped.extend(args.iter().cloned());
        ("sudo".to_string(), wrapped)
    } else {
        (resolved, args.to_vec())
    }
}

/// Events pushed from the process adapter onto the per-command channel.
#[derive(Debug)]
pub(crate) enum ProcessEvent {
    Output { stream: LogStream, chunk: String },
    Exited { exit_code: i32 },
}

/// A live, supervised process: the event feed plus a kill trigger.
pub(crate) struct SpawnedCommand {
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
    pub kill: oneshot::Sender<()>,
}

/// Spawn `command` and supervise it on background tasks.
///
/// Spawn errors are returned to the caller; everything after a successful
/// spawn is reported through the event channel only.
pub(crate) fn spawn_supervised(mut command: Command) -> std::io::Result<SpawnedCommand> {
    let mut child = command.spawn()?;

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (kill_tx, kill_rx) = oneshot::channel();

    let stdout_pump = child
        .stdout
        .take()
        .map(|pipe| tokio::spawn(pump(pipe, LogStream::Stdout, event_tx.clone())));
    let stderr_pump = child
        .stderr
        .take()
        .map(|pipe| tokio::spawn(pump(pipe, LogStream::Stderr, event_tx.clone())));

    tokio::spawn(supervise(
        child,
        stdout_pump,
        stderr_pump,
        kill_rx,
        event_tx,
    ));

    Ok(SpawnedCommand {
        events: event_rx,
        kill: kill_tx,
    })
}

/// Forward raw chunks from one pipe onto the event channel until EOF.
async fn pump<R>(mut pipe: R, stream: LogStream, events: mpsc::UnboundedSender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; PIPE_CHUNK_BYTES];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                if events.send(ProcessEvent::Output { stream, chunk }).is_err() {
                    break;
                }
            },
            Err(e) => {
                debug!(?stream, error = %e, "pipe read failed");
                break;
            },
        }
    }
}

/// Wait for exit (or a kill request), drain the pumps, then emit the
/// terminal event. The exit event is always last on the channel.
async fn supervise(
    mut child: Child,
    stdout_pump: Option<JoinHandle<()>>,
    stderr_pump: Option<JoinHandle<()>>,
    kill_rx: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<ProcessEvent>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        result = kill_rx => {
            // A dropped sender is not a kill request.
            if result.is_ok() {
                debug!("kill requested, signalling process");
                if let Err(e) = child.start_kill() {
                    warn!(error = %e, "failed to signal process");
                }
            }
            child.wait().await
        },
    };

    if let Some(h) = stdout_pump {
        let _ = h.await;
    }
    if let Some(h) = stderr_pump {
        let _ = h.await;
    }

    match status {
        Ok(status) => {
            let _ = events.send(ProcessEvent::Exited {
                exit_code: status.code().unwrap_or(-1),
            });
        },
        Err(e) => {
            // Runtime failure after spawn: absorb into the command's own
            // stderr log rather than surfacing to observers.
            let _ = events.send(ProcessEvent::Output {
                stream: LogStream::Stderr,
                chunk: format!("Error: {e}\n"),
            });
            let _ = events.send(ProcessEvent::Exited { exit_code: 1 });
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_for_known_alias() {
        assert_eq!(fallback_for("pnpm"), Some("npm"));
    }

    #[test]
    fn test_fallback_for_regular_program() {
        assert_eq!(fallback_for("cargo"), None);
        assert_eq!(fallback_for("echo"), None);
    }

    #[test]
    fn test_resolve_program_passes_through_non_alias() {
        assert_eq!(resolve_program("echo"), "echo");
    }

    #[test]
    fn test_spawn_target_plain() {
        let (program, args) = spawn_target("echo", &["ok".into()], false);
        assert_eq!(program, "echo");
        assert_eq!(args, vec!["ok".to_string()]);
    }

    #[test]
    fn test_spawn_target_elevated_prepends_program() {
        let (program, args) = spawn_target("apt-get", &["install".into(), "jq".into()], true);
        assert_eq!(program, "sudo");
        assert_eq!(
            args,
            vec![
                "apt-get".to_string(),
                "install".to_string(),
                "jq".to_string()
            ]
        );
    }
}
