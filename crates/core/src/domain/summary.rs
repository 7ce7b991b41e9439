// Job-level results summary

use crate::domain::findings::SeverityCounts;
use crate::domain::task::{Task, TaskErrorKind, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One diagnosable failure; task-scoped fields are absent for job-level errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub task_id: Option<TaskId>,
    pub model: Option<String>,
    pub app_num: Option<u32>,
    pub scan_type: Option<String>,
    pub kind: Option<TaskErrorKind>,
    pub message: String,
}

impl ErrorEntry {
    pub fn for_task(task: &Task, kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            task_id: Some(task.id.clone()),
            model: Some(task.model.clone()),
            app_num: Some(task.app_num),
            scan_type: Some(task.scan_type.to_string()),
            kind: Some(kind),
            message: message.into(),
        }
    }

    pub fn for_job(message: impl Into<String>) -> Self {
        Self {
            task_id: None,
            model: None,
            app_num: None,
            scan_type: None,
            kind: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub severity: SeverityCounts,
    pub total_issues: u64,
    /// Per-scan-type breakdown, keyed by the scan type's string form
    pub by_scan_type: BTreeMap<String, SeverityCounts>,
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub tasks_skipped: u32,
    pub errors: Vec<ErrorEntry>,
}
