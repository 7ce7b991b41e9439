// Domain Error Types

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid state transition for {entity} {id}: {from} -> {to}")]
    InvalidStateTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("Duplicate model in registry: {0}")]
    DuplicateModel(String),

    #[error("Model name must not be empty")]
    EmptyModelName,

    #[error("Model {model} has {app_count} apps, more than the maximum of {max}")]
    TooManyApps { model: String, app_count: u32, max: u32 },
}

pub type Result<T> = std::result::Result<T, DomainError>;

/// Failures of a container lifecycle action
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ContainerError {
    #[error("Container engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("No compose file found in {0}")]
    ComposeFileMissing(String),

    #[error("Step '{step}' exceeded its timeout of {timeout_secs}s")]
    StepTimeout { step: String, timeout_secs: u64 },

    #[error("Step '{step}' failed with exit code {exit_code:?}")]
    StepFailed { step: String, exit_code: Option<i32> },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

impl ContainerError {
    /// Stable machine-readable name of the failure
    pub fn kind(&self) -> &'static str {
        match self {
            ContainerError::EngineUnavailable(_) => "engine_unavailable",
            ContainerError::ComposeFileMissing(_) => "compose_file_missing",
            ContainerError::StepTimeout { .. } => "step_timeout",
            ContainerError::StepFailed { .. } => "step_failed",
            ContainerError::PermissionDenied(_) => "permission_denied",
        }
    }
}

/// Failures of port/name derivation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("Unknown model: {0}")]
    InvalidModel(String),

    #[error("Invalid app number {app_num} (must be within 1..={max})")]
    InvalidAppNumber { app_num: u32, max: u32 },

    #[error("Registry holds {models} models but the port space fits at most {max}")]
    RegistryTooLarge { models: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_error_serializes_with_kind() {
        let err = ContainerError::StepFailed {
            step: "up -d".to_string(),
            exit_code: Some(1),
        };
        assert_eq!(err.kind(), "step_failed");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({"kind": "step_failed", "detail": {"step": "up -d", "exit_code": 1}})
        );
    }
}
