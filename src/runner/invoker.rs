use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use super::command::Invocation;

/// What happened to one external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The process ran to completion. `code` is `None` when it died by signal.
    Exited {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    TimedOut,
    Cancelled,
    /// The process could not be started at all.
    SpawnFailed { message: String, not_found: bool },
}

impl AttemptOutcome {
    pub fn success() -> Self {
        AttemptOutcome::Exited {
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn exit(code: i32, stderr: impl Into<String>) -> Self {
        AttemptOutcome::Exited {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// A tool that reported on stdout only, as the stage scripts do.
    pub fn printed(code: i32, stdout: impl Into<String>) -> Self {
        AttemptOutcome::Exited {
            code: Some(code),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Exited { code: Some(0), .. })
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            AttemptOutcome::Exited { code, .. } => *code,
            _ => None,
        }
    }

    /// Short label used in the per-attempt log line.
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Exited { code: Some(0), .. } => "succeeded",
            AttemptOutcome::Exited { code: Some(_), .. } => "failed",
            AttemptOutcome::Exited { code: None, .. } => "killed",
            AttemptOutcome::TimedOut => "timed_out",
            AttemptOutcome::Cancelled => "cancelled",
            AttemptOutcome::SpawnFailed { .. } => "spawn_failed",
        }
    }
}

/// Runs one stage invocation to completion.
///
/// The orchestrator only ever talks to stage tools through this trait, so
/// tests substitute a scripted double for real processes.
#[async_trait]
pub trait StageInvoker: Send + Sync {
    async fn invoke(
        &self,
        invocation: &Invocation,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> AttemptOutcome;
}

/// Spawns stage tools as child processes.
#[derive(Debug, Default, Clone)]
pub struct ProcessInvoker;

#[async_trait]
impl StageInvoker for ProcessInvoker {
    async fn invoke(
        &self,
        invocation: &Invocation,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);
        if invocation.interactive {
            command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }
        let child = command.spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                return AttemptOutcome::SpawnFailed {
                    not_found: e.kind() == std::io::ErrorKind::NotFound,
                    message: format!("Failed to start '{}': {}", invocation.program, e),
                };
            }
        };

        let stdout = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr = tokio::spawn(read_pipe(child.stderr.take()));

        let stopped = tokio::select! {
            result = child.wait() => match result {
                Ok(status) => {
                    return AttemptOutcome::Exited {
                        code: status.code(),
                        stdout: stdout.await.unwrap_or_default(),
                        stderr: stderr.await.unwrap_or_default(),
                    };
                }
                Err(e) => AttemptOutcome::SpawnFailed {
                    not_found: false,
                    message: format!("Failed to wait for '{}': {}", invocation.program, e),
                },
            },
            _ = tokio::time::sleep(timeout) => AttemptOutcome::TimedOut,
            _ = cancel.cancelled() => AttemptOutcome::Cancelled,
        };

        terminate(&mut child, TERM_GRACE).await;
        stdout.abort();
        stderr.abort();
        stopped
    }
}

/// How long a tool gets to exit after a termination request before it is killed.
const TERM_GRACE: Duration = Duration::from_secs(5);

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Ask the tool to stop, then kill it if it has not exited within `grace`.
async fn terminate(child: &mut Child, grace: Duration) {
    if request_termination(child)
        && tokio::time::timeout(grace, child.wait()).await.is_ok()
    {
        return;
    }
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "Kill failed; process already exited");
    }
    let _ = child.wait().await;
}

#[cfg(unix)]
fn request_termination(child: &Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: `pid` is our own child and has not been reaped yet.
    unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn request_termination(_child: &Child) -> bool {
    false
}
