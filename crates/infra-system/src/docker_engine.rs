// Docker CLI container engine
// reason: the engine is driven exclusively through its CLI (`docker compose`, `docker inspect`)

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use fleetscan_core::domain::{ContainerStatus, HealthState};
use fleetscan_core::port::container_engine::{ContainerEngine, EngineError, StepOutput};

use crate::process::{run_captured, CapturedOutput, ProcessError};

const DEFAULT_PROGRAM: &str = "docker";
const INSPECT_TIMEOUT: Duration = Duration::from_secs(15);
const INSPECT_FORMAT: &str =
    "{{.State.Status}}|{{.State.Running}}|{{if .State.Health}}{{.State.Health.Status}}{{end}}";

const DAEMON_UNREACHABLE_MARKERS: &[&str] = &[
    "cannot connect to the docker daemon",
    "is the docker daemon running",
    "error during connect",
];
const MISSING_CONTAINER_MARKERS: &[&str] = &["no such object", "no such container"];

pub struct DockerCliEngine {
    program: String,
    prefix_args: Vec<String>,
}

impl Default for DockerCliEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCliEngine {
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROGRAM)
    }

    /// Use an alternative engine binary (e.g. `podman`)
    pub fn with_program(program: impl Into<String>) -> Self {
        Self::with_command(program, Vec::new())
    }

    /// Engine invoked through a wrapper, e.g. `sudo docker`
    ///
    /// `prefix_args` are placed before every engine argument list.
    pub fn with_command(program: impl Into<String>, prefix_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            prefix_args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    async fn invoke(
        &self,
        args: &[String],
        working_dir: Option<&Path>,
        timeout: Duration,
    ) -> Result<CapturedOutput, EngineError> {
        let mut command = Command::new(&self.program);
        command.args(&self.prefix_args).args(args);
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        debug!(program = %self.program, args = ?args, "Invoking container engine");
        run_captured(command, timeout).await.map_err(|e| match e {
            ProcessError::Spawn { program, source } => match source.kind() {
                std::io::ErrorKind::NotFound => {
                    EngineError::Unavailable(format!("{} not found on PATH", program))
                }
                std::io::ErrorKind::PermissionDenied => {
                    EngineError::PermissionDenied(format!("cannot execute {}", program))
                }
                _ => EngineError::Io(source.to_string()),
            },
            ProcessError::Timeout {
                timeout_ms,
                partial,
                ..
            } => EngineError::Timeout {
                timeout_ms,
                partial_output: partial,
            },
            ProcessError::Io { source, .. } => EngineError::Io(source.to_string()),
        })
    }
}

#[async_trait]
impl ContainerEngine for DockerCliEngine {
    async fn run(
        &self,
        args: &[String],
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<StepOutput, EngineError> {
        let output = self.invoke(args, Some(working_dir), timeout).await?;
        Ok(StepOutput {
            exit_code: output.exit_code,
            output: output.combined().to_string(),
        })
    }

    async fn query_status(&self, container_name: &str) -> Result<ContainerStatus, EngineError> {
        let args = vec![
            "inspect".to_string(),
            "--format".to_string(),
            INSPECT_FORMAT.to_string(),
            container_name.to_string(),
        ];
        let output = self.invoke(&args, None, INSPECT_TIMEOUT).await?;

        if output.success() {
            return parse_inspect(output.stdout.trim());
        }

        let text = output.combined().to_lowercase();
        if MISSING_CONTAINER_MARKERS.iter().any(|m| text.contains(m)) {
            Ok(ContainerStatus::not_found(container_name))
        } else if DAEMON_UNREACHABLE_MARKERS.iter().any(|m| text.contains(m)) {
            Err(EngineError::Unavailable(output.combined().trim().to_string()))
        } else if text.contains("permission denied") {
            Err(EngineError::PermissionDenied(output.combined().trim().to_string()))
        } else {
            Err(EngineError::Io(format!(
                "inspect exited with {:?}: {}",
                output.exit_code,
                output.combined().trim()
            )))
        }
    }
}

/// Parse `<status>|<running>|<health>` as produced by INSPECT_FORMAT
fn parse_inspect(line: &str) -> Result<ContainerStatus, EngineError> {
    let mut parts = line.splitn(3, '|');
    let (Some(status), Some(running)) = (parts.next(), parts.next()) else {
        return Err(EngineError::Io(format!(
            "unexpected inspect output: {:?}",
            line
        )));
    };
    let raw_health = parts.next().unwrap_or("").trim();

    let details = if raw_health.is_empty() {
        "no healthcheck configured".to_string()
    } else {
        String::new()
    };

    Ok(ContainerStatus {
        exists: true,
        running: running.trim() == "true",
        health: HealthState::from_engine(raw_health),
        status: status.trim().to_string(),
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inspect_healthy() {
        let status = parse_inspect("running|true|healthy").unwrap();
        assert!(status.exists);
        assert!(status.running);
        assert_eq!(status.health, HealthState::Healthy);
        assert_eq!(status.status, "running");
        assert!(status.is_ready());
    }

    #[test]
    fn test_parse_inspect_without_healthcheck_is_not_ready() {
        let status = parse_inspect("running|true|").unwrap();
        assert_eq!(status.health, HealthState::Unknown);
        assert_eq!(status.details, "no healthcheck configured");
        assert!(!status.is_ready());
    }

    #[test]
    fn test_parse_inspect_exited() {
        let status = parse_inspect("exited|false|unhealthy").unwrap();
        assert!(!status.running);
        assert_eq!(status.health, HealthState::Unhealthy);
    }

    #[test]
    fn test_parse_inspect_rejects_garbage() {
        assert!(matches!(parse_inspect("garbage"), Err(EngineError::Io(_))));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let engine = DockerCliEngine::with_program("fleetscan-no-such-engine");
        let err = engine
            .run(&["ps".to_string()], Path::new("."), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use tempfile::TempDir;

        /// Stand-in engine: a shell script run through `sh <script>`
        fn fake_engine(body: &str) -> (TempDir, DockerCliEngine) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("fake-docker.sh");
            std::fs::write(&path, format!("{}\n", body)).unwrap();
            let engine =
                DockerCliEngine::with_command("sh", vec![path.to_string_lossy().to_string()]);
            (dir, engine)
        }

        #[tokio::test]
        async fn test_run_reports_exit_code_and_output() {
            let (dir, engine) = fake_engine("echo \"args: $*\"; echo warn 1>&2; exit 4");
            let output = engine
                .run(
                    &["compose".to_string(), "up".to_string()],
                    dir.path(),
                    Duration::from_secs(5),
                )
                .await
                .unwrap();

            assert_eq!(output.exit_code, Some(4));
            assert!(output.output.contains("args: compose up"));
            assert!(output.output.contains("warn"));
        }

        #[tokio::test]
        async fn test_run_timeout_maps_to_engine_timeout() {
            let (dir, engine) = fake_engine("echo building; exec sleep 10");
            let err = engine
                .run(&[], dir.path(), Duration::from_millis(300))
                .await
                .unwrap_err();

            match err {
                EngineError::Timeout { partial_output, .. } => {
                    assert!(partial_output.contains("building"))
                }
                other => panic!("expected timeout, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_query_status_parses_inspect() {
            let (_dir, engine) = fake_engine("echo 'running|true|starting'");
            let status = engine.query_status("llama_app1_backend_5001").await.unwrap();
            assert!(status.running);
            assert_eq!(status.health, HealthState::Starting);
        }

        #[tokio::test]
        async fn test_query_status_missing_container() {
            let (_dir, engine) =
                fake_engine("echo 'Error: No such object: llama_app9_backend_5017' 1>&2; exit 1");
            let status = engine.query_status("llama_app9_backend_5017").await.unwrap();
            assert!(!status.exists);
            assert_eq!(status.status, "not_found");
        }

        #[tokio::test]
        async fn test_query_status_daemon_down() {
            let (_dir, engine) = fake_engine(
                "echo 'Cannot connect to the Docker daemon at unix:///var/run/docker.sock.' 1>&2; exit 1",
            );
            let err = engine.query_status("any").await.unwrap_err();
            assert!(matches!(err, EngineError::Unavailable(_)));
        }
    }
}
