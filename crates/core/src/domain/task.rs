// Task Domain Model - one model/app/scan-type unit of work

use crate::domain::error::{DomainError, Result};
use crate::domain::findings::{Issue, SeverityCounts};
use crate::domain::job::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task ID (UUID v4)
pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "skipped" => Some(TaskStatus::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Scan type of a single task
///
/// Serialized as `frontend`, `backend` or `custom:<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ScanType {
    Frontend,
    Backend,
    Custom(String),
}

impl ScanType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "frontend" => Some(ScanType::Frontend),
            "backend" => Some(ScanType::Backend),
            other => other
                .strip_prefix("custom:")
                .filter(|name| !name.is_empty())
                .map(|name| ScanType::Custom(name.to_string())),
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanType::Frontend => write!(f, "frontend"),
            ScanType::Backend => write!(f, "backend"),
            ScanType::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

impl From<ScanType> for String {
    fn from(scan_type: ScanType) -> Self {
        scan_type.to_string()
    }
}

impl TryFrom<String> for ScanType {
    type Error = String;

    fn try_from(raw: String) -> std::result::Result<Self, Self::Error> {
        ScanType::parse(&raw).ok_or_else(|| format!("invalid scan type: {}", raw))
    }
}

/// Error kinds a task can terminate with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    InvalidModel,
    InvalidAppNumber,
    EngineUnavailable,
    ComposeFileMissing,
    StepTimeout,
    StepFailed,
    PermissionDenied,
    PrerequisiteNotReady,
    AnalyzerTimeout,
    AnalyzerFailed,
    Panicked,
    Interrupted,
}

impl TaskErrorKind {
    /// Kinds worth another attempt when the job allows retries
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TaskErrorKind::PrerequisiteNotReady
                | TaskErrorKind::AnalyzerTimeout
                | TaskErrorKind::EngineUnavailable
                | TaskErrorKind::StepTimeout
        )
    }
}

impl fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskErrorKind::InvalidModel => "InvalidModel",
            TaskErrorKind::InvalidAppNumber => "InvalidAppNumber",
            TaskErrorKind::EngineUnavailable => "EngineUnavailable",
            TaskErrorKind::ComposeFileMissing => "ComposeFileMissing",
            TaskErrorKind::StepTimeout => "StepTimeout",
            TaskErrorKind::StepFailed => "StepFailed",
            TaskErrorKind::PermissionDenied => "PermissionDenied",
            TaskErrorKind::PrerequisiteNotReady => "PrerequisiteNotReady",
            TaskErrorKind::AnalyzerTimeout => "AnalyzerTimeout",
            TaskErrorKind::AnalyzerFailed => "AnalyzerFailed",
            TaskErrorKind::Panicked => "Panicked",
            TaskErrorKind::Interrupted => "Interrupted",
        };
        f.write_str(name)
    }
}

/// Captured failure of a task (raw message kept for display)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Normalized outcome of a successful analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub severity: SeverityCounts,
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl TaskResult {
    pub fn from_issues(issues: Vec<Issue>, meta: serde_json::Value) -> Self {
        Self {
            severity: SeverityCounts::from_issues(&issues),
            issues,
            meta,
        }
    }
}

/// Task Entity
///
/// Moves to `Running` exactly once and then to one terminal state exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    pub model: String,
    pub app_num: u32,
    pub scan_type: ScanType,
    pub status: TaskStatus,
    pub attempts: u32,
    pub started_at: Option<i64>, // epoch ms
    pub completed_at: Option<i64>,
    pub result: Option<TaskResult>,
    pub error: Option<TaskError>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        job_id: impl Into<String>,
        model: impl Into<String>,
        app_num: u32,
        scan_type: ScanType,
    ) -> Self {
        Self {
            id: id.into(),
            job_id: job_id.into(),
            model: model.into(),
            app_num,
            scan_type,
            status: TaskStatus::Pending,
            attempts: 0,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition_error(&self, to: TaskStatus) -> DomainError {
        DomainError::InvalidStateTransition {
            entity: "task",
            id: self.id.clone(),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// Pending -> Running
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.status != TaskStatus::Pending {
            return Err(self.transition_error(TaskStatus::Running));
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Running -> Completed
    pub fn complete(&mut self, now_millis: i64, result: TaskResult) -> Result<()> {
        if self.status != TaskStatus::Running {
            return Err(self.transition_error(TaskStatus::Completed));
        }
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now_millis);
        self.result = Some(result);
        Ok(())
    }

    /// Running -> Failed
    pub fn fail(&mut self, now_millis: i64, error: TaskError) -> Result<()> {
        if self.status != TaskStatus::Running {
            return Err(self.transition_error(TaskStatus::Failed));
        }
        self.status = TaskStatus::Failed;
        self.completed_at = Some(now_millis);
        self.error = Some(error);
        Ok(())
    }

    /// Pending|Running -> Skipped (any result is discarded)
    pub fn skip(&mut self, now_millis: i64, reason: Option<TaskError>) -> Result<()> {
        if self.is_terminal() {
            return Err(self.transition_error(TaskStatus::Skipped));
        }
        self.status = TaskStatus::Skipped;
        self.completed_at = Some(now_millis);
        self.result = None;
        self.error = reason;
        Ok(())
    }
}
