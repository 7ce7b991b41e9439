// Job Repository Port (Interface)

use crate::domain::{BatchJob, BatchStatus, JobId, Task};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for batch job and task persistence
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job together with its expanded tasks (atomic)
    async fn insert_job(&self, job: &BatchJob, tasks: &[Task]) -> Result<()>;

    /// Update job row (status, timestamps, progress, summary)
    async fn update_job(&self, job: &BatchJob) -> Result<()>;

    /// Update task row
    async fn update_task(&self, task: &Task) -> Result<()>;

    /// Find job by ID
    async fn find_job(&self, id: &JobId) -> Result<Option<BatchJob>>;

    /// All tasks of a job, in expansion order
    async fn find_tasks(&self, job_id: &JobId) -> Result<Vec<Task>>;

    /// Find all jobs by status (for recovery)
    async fn find_jobs_by_status(&self, status: BatchStatus) -> Result<Vec<BatchJob>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory repository; updates can be made to fail on demand
    #[derive(Default)]
    pub struct InMemoryJobRepository {
        jobs: Mutex<HashMap<JobId, BatchJob>>,
        tasks: Mutex<Vec<Task>>,
        fail_task_updates: AtomicBool,
    }

    impl InMemoryJobRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_task_updates(&self, fail: bool) {
            self.fail_task_updates.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl JobRepository for InMemoryJobRepository {
        async fn insert_job(&self, job: &BatchJob, tasks: &[Task]) -> Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            if jobs.contains_key(&job.id) {
                return Err(AppError::Database(format!("duplicate job {}", job.id)));
            }
            jobs.insert(job.id.clone(), job.clone());
            self.tasks.lock().unwrap().extend(tasks.iter().cloned());
            Ok(())
        }

        async fn update_job(&self, job: &BatchJob) -> Result<()> {
            match self.jobs.lock().unwrap().get_mut(&job.id) {
                Some(stored) => {
                    *stored = job.clone();
                    Ok(())
                }
                None => Err(AppError::NotFound(format!("Job {} not found", job.id))),
            }
        }

        async fn update_task(&self, task: &Task) -> Result<()> {
            if self.fail_task_updates.load(Ordering::SeqCst) {
                return Err(AppError::Database("simulated write failure".to_string()));
            }
            let mut tasks = self.tasks.lock().unwrap();
            match tasks.iter_mut().find(|t| t.id == task.id) {
                Some(stored) => {
                    *stored = task.clone();
                    Ok(())
                }
                None => Err(AppError::NotFound(format!("Task {} not found", task.id))),
            }
        }

        async fn find_job(&self, id: &JobId) -> Result<Option<BatchJob>> {
            Ok(self.jobs.lock().unwrap().get(id).cloned())
        }

        async fn find_tasks(&self, job_id: &JobId) -> Result<Vec<Task>> {
            Ok(self
                .tasks
                .lock()
                .unwrap()
                .iter()
                .filter(|t| &t.job_id == job_id)
                .cloned()
                .collect())
        }

        async fn find_jobs_by_status(&self, status: BatchStatus) -> Result<Vec<BatchJob>> {
            let mut jobs: Vec<BatchJob> = self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|j| j.status == status)
                .cloned()
                .collect();
            jobs.sort_by_key(|j| j.created_at);
            Ok(jobs)
        }
    }
}
