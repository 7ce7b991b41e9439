// Crash recovery - close out jobs left running by a previous daemon
use crate::application::progress::ProgressAggregator;
use crate::domain::{BatchStatus, ErrorEntry, TaskError, TaskErrorKind};
use crate::port::{JobRepository, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Crash recovery service
///
/// On daemon startup, jobs still marked `running` have no live workers.
/// Their non-terminal tasks are skipped as `Interrupted` and the job is
/// failed, so no job stays `running` forever.
pub struct RecoveryService {
    job_repo: Arc<dyn JobRepository>,
    time_provider: Arc<dyn TimeProvider>,
}

impl RecoveryService {
    pub fn new(job_repo: Arc<dyn JobRepository>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            job_repo,
            time_provider,
        }
    }

    /// Recover interrupted jobs
    ///
    /// # Returns
    /// Number of jobs recovered
    pub async fn recover_interrupted_jobs(&self) -> crate::error::Result<usize> {
        let running_jobs = self.job_repo.find_jobs_by_status(BatchStatus::Running).await?;
        info!(candidates = running_jobs.len(), "Starting interrupted job recovery");

        let mut recovered_count = 0;
        for mut job in running_jobs {
            let now = self.time_provider.now_millis();
            let mut interrupted = 0;

            for mut task in self.job_repo.find_tasks(&job.id).await? {
                if task.is_terminal() {
                    continue;
                }
                let reason = TaskError::new(
                    TaskErrorKind::Interrupted,
                    "daemon restarted while the task was not finished",
                );
                task.skip(now, Some(reason))?;
                ProgressAggregator::merge(&mut job, &task);
                self.job_repo.update_task(&task).await?;
                interrupted += 1;
            }

            job.results_summary
                .errors
                .push(ErrorEntry::for_job("job interrupted by daemon restart"));
            if let Err(e) = job.fail(now) {
                warn!(job_id = %job.id, error = %e, "Interrupted job could not be failed");
                continue;
            }
            self.job_repo.update_job(&job).await?;

            info!(
                job_id = %job.id,
                interrupted_tasks = interrupted,
                "Interrupted job marked as FAILED"
            );
            recovered_count += 1;
        }

        info!(recovered_count = %recovered_count, "Interrupted job recovery complete");
        Ok(recovered_count)
    }
}
