// Progress aggregation - folds terminal tasks into the job summary

use crate::domain::{BatchJob, ErrorEntry, Task, TaskStatus};
use tracing::warn;

/// Stateless merge of task outcomes into a job
///
/// Call exactly once per task, after it reached a terminal status.
pub struct ProgressAggregator;

impl ProgressAggregator {
    /// Merge one terminal task; returns false (and changes nothing) otherwise
    pub fn merge(job: &mut BatchJob, task: &Task) -> bool {
        let summary = &mut job.results_summary;
        match task.status {
            TaskStatus::Completed => {
                summary.tasks_completed += 1;
                if let Some(result) = &task.result {
                    summary.severity += result.severity;
                    summary.total_issues += result.severity.total();
                    *summary
                        .by_scan_type
                        .entry(task.scan_type.to_string())
                        .or_default() += result.severity;
                }
            }
            TaskStatus::Failed => {
                summary.tasks_failed += 1;
                if let Some(error) = &task.error {
                    summary
                        .errors
                        .push(ErrorEntry::for_task(task, error.kind, &error.message));
                }
            }
            TaskStatus::Skipped => {
                summary.tasks_skipped += 1;
                if let Some(error) = &task.error {
                    summary
                        .errors
                        .push(ErrorEntry::for_task(task, error.kind, &error.message));
                }
            }
            TaskStatus::Pending | TaskStatus::Running => {
                warn!(task_id = %task.id, status = %task.status, "Refusing to merge non-terminal task");
                return false;
            }
        }

        job.progress.completed = (job.progress.completed + 1).min(job.progress.total);
        true
    }
}
