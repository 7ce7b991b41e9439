//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results (ADR-020).
//! `batch.create.v1` takes a `JobSpec` directly; `batch.start.v1` and
//! `batch.status.v1` return the `BatchJob` snapshot.

use fleetscan_core::domain::{BatchStatus, ContainerAction, ContainerStatus, Task};
use serde::{Deserialize, Serialize};

/// Method names
pub mod method {
    pub const BATCH_CREATE: &str = "batch.create.v1";
    pub const BATCH_START: &str = "batch.start.v1";
    pub const BATCH_STATUS: &str = "batch.status.v1";
    pub const BATCH_CANCEL: &str = "batch.cancel.v1";
    pub const BATCH_EXPORT: &str = "batch.export.v1";
    pub const CONTAINER_ACTION: &str = "container.action.v1";
    pub const CONTAINER_HEALTH: &str = "container.health.v1";
}

/// Params of every method addressed by job id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobIdRequest {
    pub job_id: String,
}

/// batch.create.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: String,
    pub status: BatchStatus,
    pub total_tasks: u32,
}

/// batch.cancel.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub acknowledged: bool,
    pub status: BatchStatus,
}

/// batch.export.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub job_id: String,
    pub tasks: Vec<Task>,
}

/// container.action.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerActionRequest {
    pub model: String,
    pub app_num: u32,
    pub action: ContainerAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerActionResponse {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// container.health.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHealthRequest {
    pub model: String,
    pub app_num: u32,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHealthResponse {
    pub healthy: bool,
    pub message: String,
    pub polls: u32,
    #[serde(default)]
    pub backend: Option<ContainerStatus>,
    #[serde(default)]
    pub frontend: Option<ContainerStatus>,
}
