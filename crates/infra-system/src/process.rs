// Bounded child-process runner shared by the docker engine and command analyzers
// reason: tokio::process with concurrent pipe draining so partial output survives a timeout

use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Time a child gets between SIGTERM and SIGKILL
const GRACEFUL_KILL_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to keep draining pipes after the child exited
///
/// A grandchild can inherit the pipes and keep them open indefinitely.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

const READ_CHUNK: usize = 8192;

/// Output of a process that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// None when terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    combined: String,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout and stderr interleaved in arrival order
    pub fn combined(&self) -> &str {
        &self.combined
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} timed out after {timeout_ms}ms")]
    Timeout {
        program: String,
        timeout_ms: u64,
        /// Combined output captured before the process was stopped
        partial: String,
    },

    #[error("IO error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Default)]
struct Capture {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    combined: Vec<u8>,
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Run `command` to completion, bounded by `limit`
///
/// A non-zero exit is returned as `Ok`; only spawn failures, IO failures and
/// timeouts are errors. On timeout the child is sent SIGTERM, given a short
/// grace period, then killed.
pub async fn run_captured(mut command: Command, limit: Duration) -> Result<CapturedOutput, ProcessError> {
    let program = command.as_std().get_program().to_string_lossy().to_string();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;
    debug!(program = %program, pid = ?child.id(), "Spawned child process");

    let capture = Arc::new(Mutex::new(Capture::default()));
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(drain(stdout, capture.clone(), Stream::Stdout)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(drain(stderr, capture.clone(), Stream::Stderr)));
    }

    let waited = tokio::time::timeout(limit, child.wait()).await;
    match waited {
        Ok(Ok(status)) => {
            finish_readers(readers).await;
            let capture = capture.lock().await;
            Ok(CapturedOutput {
                exit_code: status.code(),
                stdout: String::from_utf8_lossy(&capture.stdout).to_string(),
                stderr: String::from_utf8_lossy(&capture.stderr).to_string(),
                combined: String::from_utf8_lossy(&capture.combined).to_string(),
            })
        }
        Ok(Err(source)) => {
            finish_readers(readers).await;
            Err(ProcessError::Io { program, source })
        }
        Err(_) => {
            warn!(
                program = %program,
                timeout_ms = limit.as_millis() as u64,
                "Child process timed out, terminating"
            );
            kill_graceful(&mut child).await;
            finish_readers(readers).await;
            let partial = String::from_utf8_lossy(&capture.lock().await.combined).to_string();
            Err(ProcessError::Timeout {
                program,
                timeout_ms: limit.as_millis() as u64,
                partial,
            })
        }
    }
}

async fn drain<R>(mut reader: R, capture: Arc<Mutex<Capture>>, stream: Stream)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut capture = capture.lock().await;
                match stream {
                    Stream::Stdout => capture.stdout.extend_from_slice(&chunk[..n]),
                    Stream::Stderr => capture.stderr.extend_from_slice(&chunk[..n]),
                }
                capture.combined.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

async fn finish_readers(readers: Vec<JoinHandle<()>>) {
    for mut reader in readers {
        if tokio::time::timeout(PIPE_DRAIN_TIMEOUT, &mut reader).await.is_err() {
            debug!("Pipe still held open after exit, abandoning reader");
            reader.abort();
        }
    }
}

/// SIGTERM first, SIGKILL if the child ignores it (ADR-002)
async fn kill_graceful(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            info!(pid = pid, "Sending SIGTERM for graceful shutdown");
            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                && tokio::time::timeout(GRACEFUL_KILL_TIMEOUT, child.wait())
                    .await
                    .is_ok()
            {
                info!(pid = pid, "Process exited after SIGTERM");
                return;
            }
            warn!(pid = pid, "Process did not exit after SIGTERM, sending SIGKILL");
        }
    }

    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill child process");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[tokio::test]
    async fn test_captures_both_streams() {
        let output = run_captured(sh("echo out; echo err 1>&2"), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(output.combined().contains("out"));
        assert!(output.combined().contains("err"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_error() {
        let output = run_captured(sh("echo broken; exit 3"), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!output.success());
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout, "broken\n");
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let err = run_captured(sh("echo started; exec sleep 10"), Duration::from_millis(300))
            .await
            .unwrap_err();

        match err {
            ProcessError::Timeout {
                timeout_ms,
                partial,
                ..
            } => {
                assert_eq!(timeout_ms, 300);
                assert!(partial.contains("started"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = run_captured(
            Command::new("fleetscan-definitely-not-a-binary"),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

        match err {
            ProcessError::Spawn { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound)
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }
}
