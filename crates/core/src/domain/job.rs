// Batch Job Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::summary::ResultsSummary;
use crate::domain::task::ScanType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Job ID (UUID v4)
pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Cancelled
        )
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(BatchStatus::Pending),
            "running" => Some(BatchStatus::Running),
            "completed" => Some(BatchStatus::Completed),
            "failed" => Some(BatchStatus::Failed),
            "cancelled" => Some(BatchStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::Pending => write!(f, "pending"),
            BatchStatus::Running => write!(f, "running"),
            BatchStatus::Completed => write!(f, "completed"),
            BatchStatus::Failed => write!(f, "failed"),
            BatchStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Requested analysis categories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanSelection {
    Frontend,
    Backend,
    Both,
    /// Named custom analyzers
    Custom(Vec<String>),
}

impl ScanSelection {
    /// Expand to the per-task scan types (deduplicated, order preserved)
    pub fn scan_types(&self) -> Vec<ScanType> {
        match self {
            ScanSelection::Frontend => vec![ScanType::Frontend],
            ScanSelection::Backend => vec![ScanType::Backend],
            ScanSelection::Both => vec![ScanType::Frontend, ScanType::Backend],
            ScanSelection::Custom(names) => {
                let mut types: Vec<ScanType> = Vec::with_capacity(names.len());
                for name in names {
                    let scan_type = ScanType::Custom(name.trim().to_string());
                    if !types.contains(&scan_type) {
                        types.push(scan_type);
                    }
                }
                types
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    pub full_scan: bool,
    /// Start containers and wait for them to be healthy before analysis
    pub ensure_containers: bool,
    /// Per-analyzer option bag keyed by scan type string form
    pub analyzer_options: BTreeMap<String, serde_json::Value>,
    pub task_timeout_secs: Option<u64>,
    /// Extra attempts for transient task failures
    pub max_retries: u32,
    pub health_max_retries: Option<u32>,
    pub health_retry_delay_ms: Option<u64>,
}

impl JobOptions {
    /// Options handed to the analyzer of one scan type
    pub fn analyzer_options_for(&self, scan_type: &ScanType) -> serde_json::Value {
        let mut options = match self.analyzer_options.get(&scan_type.to_string()) {
            Some(serde_json::Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        options
            .entry("full_scan")
            .or_insert(serde_json::Value::Bool(self.full_scan));
        serde_json::Value::Object(options)
    }
}

/// Submission payload for a new batch job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub scan_type: ScanSelection,
    pub models: Vec<String>,
    /// Per-model app-range selector; absent or empty = all apps
    #[serde(default)]
    pub app_ranges: BTreeMap<String, String>,
    #[serde(default)]
    pub options: JobOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: u32,
    pub total: u32,
}

/// Batch Job Entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: JobId,
    pub name: String,
    pub description: String,
    pub scan_type: ScanSelection,
    pub models: Vec<String>,
    pub app_ranges: BTreeMap<String, String>,
    pub options: JobOptions,
    pub status: BatchStatus,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,

    pub progress: Progress,
    pub results_summary: ResultsSummary,
    pub cancel_requested: bool,
}

impl BatchJob {
    /// Create a pending job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `spec` - Validated job specification
    /// * `total_tasks` - Number of expanded tasks
    pub fn new(id: impl Into<String>, created_at: i64, spec: JobSpec, total_tasks: u32) -> Self {
        Self {
            id: id.into(),
            name: spec.name,
            description: spec.description,
            scan_type: spec.scan_type,
            models: spec.models,
            app_ranges: spec.app_ranges,
            options: spec.options,
            status: BatchStatus::Pending,
            created_at,
            started_at: None,
            completed_at: None,
            progress: Progress {
                completed: 0,
                total: total_tasks,
            },
            results_summary: ResultsSummary::default(),
            cancel_requested: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition_error(&self, to: BatchStatus) -> DomainError {
        DomainError::InvalidStateTransition {
            entity: "job",
            id: self.id.clone(),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// Pending -> Running
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.status != BatchStatus::Pending {
            return Err(self.transition_error(BatchStatus::Running));
        }
        self.status = BatchStatus::Running;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Close a job whose tasks are all terminal: `Cancelled` if cancellation
    /// was requested, `Completed` otherwise
    pub fn finish(&mut self, now_millis: i64) -> Result<()> {
        let target = if self.cancel_requested {
            BatchStatus::Cancelled
        } else {
            BatchStatus::Completed
        };
        if self.is_terminal() {
            return Err(self.transition_error(target));
        }
        self.status = target;
        self.completed_at = Some(now_millis);
        Ok(())
    }

    /// Mark as Failed (zero tasks or scheduler bookkeeping failure)
    pub fn fail(&mut self, now_millis: i64) -> Result<()> {
        if self.is_terminal() {
            return Err(self.transition_error(BatchStatus::Failed));
        }
        self.status = BatchStatus::Failed;
        self.completed_at = Some(now_millis);
        Ok(())
    }
}
