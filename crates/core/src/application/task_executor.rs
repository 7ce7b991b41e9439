// Task executor - runs one (model, app, scan type) analysis

use crate::application::container_lifecycle::ContainerLifecycleManager;
use crate::application::port_allocator::PortAllocator;
use crate::application::worker::constants::{
    DEFAULT_HEALTH_MAX_RETRIES, DEFAULT_HEALTH_RETRY_DELAY, DEFAULT_TASK_TIMEOUT,
};
use crate::application::worker::CancelToken;
use crate::domain::{
    ContainerAction, ContainerError, JobOptions, PortError, ScanType, Task, TaskError,
    TaskErrorKind, TaskResult,
};
use crate::port::{AnalyzerError, AnalyzerSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Process-wide executor defaults, overridable per job through `JobOptions`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub task_timeout: Duration,
    pub health_max_retries: u32,
    pub health_retry_delay: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            task_timeout: DEFAULT_TASK_TIMEOUT,
            health_max_retries: DEFAULT_HEALTH_MAX_RETRIES,
            health_retry_delay: DEFAULT_HEALTH_RETRY_DELAY,
        }
    }
}

/// Outcome of one execution attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(TaskResult),
    Failed(TaskError),
    /// Cancellation observed before an external call
    Cancelled,
}

pub struct TaskExecutor {
    allocator: Arc<PortAllocator>,
    lifecycle: Arc<ContainerLifecycleManager>,
    analyzers: AnalyzerSet,
    settings: ExecutorSettings,
}

impl TaskExecutor {
    pub fn new(
        allocator: Arc<PortAllocator>,
        lifecycle: Arc<ContainerLifecycleManager>,
        analyzers: AnalyzerSet,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            allocator,
            lifecycle,
            analyzers,
            settings,
        }
    }

    pub fn supports(&self, scan_type: &ScanType) -> bool {
        self.analyzers.supports(scan_type)
    }

    /// Execute one task attempt; never panics on collaborator errors
    pub async fn execute(
        &self,
        task: &Task,
        options: &JobOptions,
        cancel: &CancelToken,
    ) -> TaskOutcome {
        let instance = match self.allocator.instance(&task.model, task.app_num) {
            Ok(instance) => instance,
            Err(e) => return TaskOutcome::Failed(port_failure(e)),
        };

        if options.ensure_containers {
            if cancel.is_cancelled() {
                return TaskOutcome::Cancelled;
            }
            let started = self
                .lifecycle
                .perform(ContainerAction::Start, &instance)
                .await;
            if !started.success {
                let error = started.error.map(container_failure).unwrap_or_else(|| {
                    TaskError::new(TaskErrorKind::StepFailed, "container start failed")
                });
                return TaskOutcome::Failed(error);
            }

            if cancel.is_cancelled() {
                return TaskOutcome::Cancelled;
            }
            let max_retries = options
                .health_max_retries
                .unwrap_or(self.settings.health_max_retries);
            let retry_delay = options
                .health_retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(self.settings.health_retry_delay);
            let report = self
                .lifecycle
                .verify_health(&instance, max_retries, retry_delay, cancel)
                .await;
            if !report.healthy {
                if cancel.is_cancelled() {
                    return TaskOutcome::Cancelled;
                }
                return TaskOutcome::Failed(TaskError::new(
                    TaskErrorKind::PrerequisiteNotReady,
                    report.message,
                ));
            }
        }

        if cancel.is_cancelled() {
            return TaskOutcome::Cancelled;
        }
        let Some(analyzer) = self.analyzers.get(&task.scan_type) else {
            return TaskOutcome::Failed(TaskError::new(
                TaskErrorKind::AnalyzerFailed,
                format!("no analyzer registered for scan type {}", task.scan_type),
            ));
        };

        let timeout = options
            .task_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.settings.task_timeout);
        let analyzer_options = options.analyzer_options_for(&task.scan_type);

        debug!(
            task_id = %task.id,
            scan_type = %task.scan_type,
            backend_port = instance.ports.backend_port,
            "Running analyzer"
        );
        let result =
            tokio::time::timeout(timeout, analyzer.analyze(&instance, &analyzer_options, timeout))
                .await;

        match result {
            Ok(Ok(report)) => {
                let result = TaskResult::from_issues(report.issues, report.meta);
                info!(
                    task_id = %task.id,
                    issues = result.issues.len(),
                    "Analysis completed"
                );
                TaskOutcome::Completed(result)
            }
            Ok(Err(AnalyzerError::Timeout(_))) | Err(_) => {
                warn!(task_id = %task.id, timeout_secs = timeout.as_secs(), "Analyzer timed out");
                TaskOutcome::Failed(TaskError::new(
                    TaskErrorKind::AnalyzerTimeout,
                    format!("analyzer exceeded {}s", timeout.as_secs()),
                ))
            }
            Ok(Err(AnalyzerError::Failed(message))) => {
                warn!(task_id = %task.id, error = %message, "Analyzer failed");
                TaskOutcome::Failed(TaskError::new(TaskErrorKind::AnalyzerFailed, message))
            }
        }
    }
}

fn port_failure(error: PortError) -> TaskError {
    let kind = match error {
        PortError::InvalidAppNumber { .. } => TaskErrorKind::InvalidAppNumber,
        PortError::InvalidModel(_) | PortError::RegistryTooLarge { .. } => {
            TaskErrorKind::InvalidModel
        }
    };
    TaskError::new(kind, error.to_string())
}

fn container_failure(error: ContainerError) -> TaskError {
    let kind = match error {
        ContainerError::EngineUnavailable(_) => TaskErrorKind::EngineUnavailable,
        ContainerError::ComposeFileMissing(_) => TaskErrorKind::ComposeFileMissing,
        ContainerError::StepTimeout { .. } => TaskErrorKind::StepTimeout,
        ContainerError::StepFailed { .. } => TaskErrorKind::StepFailed,
        ContainerError::PermissionDenied(_) => TaskErrorKind::PermissionDenied,
    };
    TaskError::new(kind, error.to_string())
}
