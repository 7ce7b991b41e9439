// Container Engine Port
// Narrow "process runner" seam: the only engine surface the core needs

use crate::domain::ContainerStatus;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Result of one engine command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    /// None when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// stdout and stderr, combined
    pub output: String,
}

impl StepOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Command timed out after {timeout_ms}ms")]
    Timeout {
        timeout_ms: u64,
        partial_output: String,
    },

    #[error("IO error: {0}")]
    Io(String),
}

/// Container engine collaborator
///
/// Implementations:
/// - DockerCliEngine: spawns the `docker` binary (infra-system)
/// - mocks::ScriptedEngine: deterministic fake for tests
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Run one engine command in `working_dir`, bounded by `timeout`
    ///
    /// A non-zero exit is *not* an error here; it is reported via `exit_code`.
    async fn run(
        &self,
        args: &[String],
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<StepOutput, EngineError>;

    /// Fetch the current status of a container by name
    async fn query_status(&self, container_name: &str) -> Result<ContainerStatus, EngineError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Scripted engine
    ///
    /// `run` consumes scripted responses in order (exit 0 once exhausted).
    /// `query_status` consumes a per-container script; the last entry repeats.
    #[derive(Default)]
    pub struct ScriptedEngine {
        run_script: Mutex<VecDeque<Result<StepOutput, EngineError>>>,
        run_calls: Mutex<Vec<Vec<String>>>,
        status_script: Mutex<HashMap<String, VecDeque<ContainerStatus>>>,
        status_calls: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedEngine {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_run(&self, response: Result<StepOutput, EngineError>) {
            self.run_script.lock().unwrap().push_back(response);
        }

        pub fn push_exit(&self, exit_code: i32, output: &str) {
            self.push_run(Ok(StepOutput {
                exit_code: Some(exit_code),
                output: output.to_string(),
            }));
        }

        pub fn script_status(&self, container: &str, statuses: Vec<ContainerStatus>) {
            self.status_script
                .lock()
                .unwrap()
                .insert(container.to_string(), statuses.into());
        }

        pub fn run_calls(&self) -> Vec<Vec<String>> {
            self.run_calls.lock().unwrap().clone()
        }

        pub fn status_calls(&self, container: &str) -> usize {
            self.status_calls
                .lock()
                .unwrap()
                .get(container)
                .copied()
                .unwrap_or(0)
        }

        pub fn total_calls(&self) -> usize {
            self.run_calls.lock().unwrap().len()
                + self.status_calls.lock().unwrap().values().sum::<usize>()
        }
    }

    #[async_trait]
    impl ContainerEngine for ScriptedEngine {
        async fn run(
            &self,
            args: &[String],
            _working_dir: &Path,
            _timeout: Duration,
        ) -> Result<StepOutput, EngineError> {
            self.run_calls.lock().unwrap().push(args.to_vec());
            self.run_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(StepOutput {
                        exit_code: Some(0),
                        output: String::new(),
                    })
                })
        }

        async fn query_status(&self, container_name: &str) -> Result<ContainerStatus, EngineError> {
            *self
                .status_calls
                .lock()
                .unwrap()
                .entry(container_name.to_string())
                .or_insert(0) += 1;

            let mut scripts = self.status_script.lock().unwrap();
            let status = match scripts.get_mut(container_name) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            };
            Ok(status.unwrap_or_else(|| ContainerStatus::not_found(container_name)))
        }
    }
}
