//! Container lifecycle manager
//!
//! Drives compose-based container pairs through multi-step actions and polls
//! their health. Every step goes through the [`ContainerEngine`] port, so the
//! core never shells out itself.

use crate::application::worker::CancelToken;
use crate::domain::{AppInstance, ContainerAction, ContainerError, ContainerStatus, HealthState};
use crate::port::{ContainerEngine, EngineError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Compose file names searched in order
pub const COMPOSE_FILE_NAMES: [&str; 4] = [
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

/// One compose invocation of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionStep {
    pub name: &'static str,
    pub args: &'static [&'static str],
    pub timeout_secs: u64,
    pub abort_on_failure: bool,
}

const UP: ActionStep = ActionStep {
    name: "up",
    args: &["up", "-d"],
    timeout_secs: 120,
    abort_on_failure: true,
};

const DOWN: ActionStep = ActionStep {
    name: "down",
    args: &["down"],
    timeout_secs: 60,
    abort_on_failure: true,
};

const DOWN_BEST_EFFORT: ActionStep = ActionStep {
    abort_on_failure: false,
    ..DOWN
};

const BUILD: ActionStep = ActionStep {
    name: "build",
    args: &["build"],
    timeout_secs: 600,
    abort_on_failure: true,
};

const BUILD_NO_CACHE: ActionStep = ActionStep {
    name: "build --no-cache",
    args: &["build", "--no-cache"],
    timeout_secs: 900,
    abort_on_failure: true,
};

/// Ordered steps of an action
pub fn steps_for(action: ContainerAction) -> &'static [ActionStep] {
    match action {
        ContainerAction::Start => &[UP],
        ContainerAction::Stop => &[DOWN],
        ContainerAction::Restart => &[DOWN_BEST_EFFORT, UP],
        ContainerAction::Build => &[BUILD],
        ContainerAction::Rebuild => &[DOWN_BEST_EFFORT, BUILD_NO_CACHE, UP],
    }
}

/// Result of a lifecycle action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub action: ContainerAction,
    pub success: bool,
    /// Output of every executed step, each under a `$ <step>` header
    pub output: String,
    pub error: Option<ContainerError>,
    pub steps_run: usize,
}

/// Result of health verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub message: String,
    pub polls: u32,
    pub backend: Option<ContainerStatus>,
    pub frontend: Option<ContainerStatus>,
}

pub struct ContainerLifecycleManager {
    engine: Arc<dyn ContainerEngine>,
    apps_root: PathBuf,
}

impl ContainerLifecycleManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, apps_root: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            apps_root: apps_root.into(),
        }
    }

    /// `<apps_root>/<model>/app<N>`
    pub fn app_dir(&self, instance: &AppInstance) -> PathBuf {
        self.apps_root
            .join(&instance.model)
            .join(format!("app{}", instance.app_num))
    }

    /// Locate the compose file of an app instance
    pub fn compose_file(&self, instance: &AppInstance) -> Result<PathBuf, ContainerError> {
        let dir = self.app_dir(instance);
        COMPOSE_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| ContainerError::ComposeFileMissing(dir.display().to_string()))
    }

    /// Run every step of `action`, honoring each step's abort flag
    pub async fn perform(&self, action: ContainerAction, instance: &AppInstance) -> ActionOutcome {
        let compose_file = match self.compose_file(instance) {
            Ok(path) => path,
            Err(e) => {
                warn!(model = %instance.model, app_num = instance.app_num, error = %e, "Compose file missing");
                return ActionOutcome {
                    action,
                    success: false,
                    output: String::new(),
                    error: Some(e),
                    steps_run: 0,
                };
            }
        };
        let working_dir = compose_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.app_dir(instance));

        info!(
            action = %action,
            project = %instance.project_name,
            "Performing container action"
        );

        let mut output = String::new();
        let mut steps_run = 0;

        for step in steps_for(action) {
            steps_run += 1;
            let args = compose_args(&compose_file, &instance.project_name, step);
            output.push_str(&format!("$ {}\n", step.name));

            let result = self
                .engine
                .run(&args, &working_dir, Duration::from_secs(step.timeout_secs))
                .await;

            let failure = match result {
                Ok(step_output) => {
                    output.push_str(&step_output.output);
                    if step_output.success() {
                        None
                    } else {
                        Some(classify_failure(
                            step.name,
                            step_output.exit_code,
                            &step_output.output,
                        ))
                    }
                }
                Err(EngineError::Timeout { partial_output, .. }) => {
                    output.push_str(&partial_output);
                    Some(ContainerError::StepTimeout {
                        step: step.name.to_string(),
                        timeout_secs: step.timeout_secs,
                    })
                }
                Err(EngineError::Unavailable(msg)) | Err(EngineError::Io(msg)) => {
                    output.push_str(&msg);
                    Some(ContainerError::EngineUnavailable(msg))
                }
                Err(EngineError::PermissionDenied(msg)) => {
                    output.push_str(&msg);
                    Some(ContainerError::PermissionDenied(msg))
                }
            };
            if !output.ends_with('\n') && !output.is_empty() {
                output.push('\n');
            }

            if let Some(error) = failure {
                if step.abort_on_failure {
                    warn!(action = %action, step = step.name, error = %error, "Action aborted");
                    return ActionOutcome {
                        action,
                        success: false,
                        output,
                        error: Some(error),
                        steps_run,
                    };
                }
                debug!(action = %action, step = step.name, error = %error, "Best-effort step failed");
            }
        }

        ActionOutcome {
            action,
            success: true,
            output,
            error: None,
            steps_run,
        }
    }

    /// Fresh status of both containers of an instance
    pub async fn status(&self, instance: &AppInstance) -> (ContainerStatus, ContainerStatus) {
        tokio::join!(
            self.query(&instance.backend_container),
            self.query(&instance.frontend_container)
        )
    }

    /// Poll until both containers are running and healthy
    ///
    /// At most `max_retries` polls, sleeping `retry_delay` between them.
    /// Returns early with `healthy = false` when `cancel` fires.
    pub async fn verify_health(
        &self,
        instance: &AppInstance,
        max_retries: u32,
        retry_delay: Duration,
        cancel: &CancelToken,
    ) -> HealthReport {
        let mut last: Option<(ContainerStatus, ContainerStatus)> = None;

        for poll in 1..=max_retries {
            if cancel.is_cancelled() {
                return cancelled_report(poll - 1, last);
            }

            let (backend, frontend) = self.status(instance).await;
            if backend.is_ready() && frontend.is_ready() {
                info!(project = %instance.project_name, polls = poll, "Containers healthy");
                return HealthReport {
                    healthy: true,
                    message: format!("containers healthy after {} poll(s)", poll),
                    polls: poll,
                    backend: Some(backend),
                    frontend: Some(frontend),
                };
            }
            debug!(
                project = %instance.project_name,
                poll = poll,
                backend = %backend,
                frontend = %frontend,
                "Containers not ready yet"
            );
            last = Some((backend, frontend));

            if poll < max_retries {
                let cancelled = tokio::select! {
                    _ = tokio::time::sleep(retry_delay) => false,
                    _ = cancel.cancelled() => true,
                };
                if cancelled {
                    return cancelled_report(poll, last);
                }
            }
        }

        let message = match &last {
            Some((backend, frontend)) => format!(
                "containers not healthy after {} poll(s): backend {}, frontend {}",
                max_retries, backend, frontend
            ),
            None => "no health polls permitted".to_string(),
        };
        warn!(project = %instance.project_name, "{}", message);

        let (backend, frontend) = last.unzip();
        HealthReport {
            healthy: false,
            message,
            polls: max_retries,
            backend,
            frontend,
        }
    }

    async fn query(&self, container_name: &str) -> ContainerStatus {
        match self.engine.query_status(container_name).await {
            Ok(status) => status,
            Err(e) => ContainerStatus {
                exists: false,
                running: false,
                health: HealthState::Unknown,
                status: "error".to_string(),
                details: e.to_string(),
            },
        }
    }
}

fn cancelled_report(polls: u32, last: Option<(ContainerStatus, ContainerStatus)>) -> HealthReport {
    let (backend, frontend) = last.unzip();
    HealthReport {
        healthy: false,
        message: format!("health check cancelled after {} poll(s)", polls),
        polls,
        backend,
        frontend,
    }
}

/// `compose -f <file> -p <project> <step args...>`
fn compose_args(compose_file: &Path, project: &str, step: &ActionStep) -> Vec<String> {
    let mut args = vec![
        "compose".to_string(),
        "-f".to_string(),
        compose_file.display().to_string(),
        "-p".to_string(),
        project.to_string(),
    ];
    args.extend(step.args.iter().map(|arg| arg.to_string()));
    args
}

/// Map a non-zero step exit to a failure kind from its output text
fn classify_failure(step: &str, exit_code: Option<i32>, output: &str) -> ContainerError {
    let lowered = output.to_ascii_lowercase();
    if lowered.contains("cannot connect to the docker daemon")
        || lowered.contains("is the docker daemon running")
        || lowered.contains("error during connect")
    {
        ContainerError::EngineUnavailable(last_line(output))
    } else if lowered.contains("permission denied") {
        ContainerError::PermissionDenied(last_line(output))
    } else {
        ContainerError::StepFailed {
            step: step.to_string(),
            exit_code,
        }
    }
}

fn last_line(output: &str) -> String {
    output
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_string()
}
