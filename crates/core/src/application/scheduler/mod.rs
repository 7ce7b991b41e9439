// Job scheduler - batch job lifecycle, bounded dispatch and aggregation
//
// Every mutation of a job and its tasks happens under that job's lock and is
// persisted before the lock is released. Task execution itself runs outside
// the lock on a worker drawn from the pool. A job leaves the in-memory map
// once it is terminal, idle and fully persisted; reads then go to the
// repository.

mod expand;

pub use expand::{expand, PlannedTask};

use crate::application::progress::ProgressAggregator;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::application::task_executor::{TaskExecutor, TaskOutcome};
use crate::application::worker::constants::{
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_WORKER_POOL_WIDTH,
};
use crate::application::worker::{cancel_channel, CancelHandle, CancelToken, PoolScope, WorkerPool};
use crate::domain::{
    BatchJob, BatchStatus, ErrorEntry, JobId, JobOptions, JobSpec, ModelRegistry, Task,
    TaskError, TaskErrorKind, TaskStatus,
};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobRepository, TimeProvider};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub worker_pool_width: usize,
    pub pool_scope: PoolScope,
    pub retry_base_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_pool_width: DEFAULT_WORKER_POOL_WIDTH,
            pool_scope: PoolScope::Global,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }
}

/// Authoritative in-memory state of one job
struct JobRecord {
    job: BatchJob,
    tasks: Vec<Task>,
    in_flight: usize,
    /// Sticky; the repository may be behind the in-memory state
    persist_failed: bool,
}

impl JobRecord {
    /// Skip and merge every pending task; returns their indices
    fn skip_pending(&mut self, now_millis: i64) -> Vec<usize> {
        let JobRecord { job, tasks, .. } = self;
        let mut skipped = Vec::new();
        for (index, task) in tasks.iter_mut().enumerate() {
            if task.status == TaskStatus::Pending && task.skip(now_millis, None).is_ok() {
                ProgressAggregator::merge(job, task);
                skipped.push(index);
            }
        }
        skipped
    }
}

struct ActiveJob {
    record: Mutex<JobRecord>,
    cancel: CancelHandle,
}

impl ActiveJob {
    fn new(job: BatchJob, tasks: Vec<Task>) -> Self {
        let (cancel, _) = cancel_channel();
        Self {
            record: Mutex::new(JobRecord {
                job,
                tasks,
                in_flight: 0,
                persist_failed: false,
            }),
            cancel,
        }
    }
}

struct Inner {
    registry: Arc<ModelRegistry>,
    executor: Arc<TaskExecutor>,
    repo: Arc<dyn JobRepository>,
    ids: Arc<dyn IdProvider>,
    clock: Arc<dyn TimeProvider>,
    pool: WorkerPool,
    retry: RetryPolicy,
    jobs: RwLock<HashMap<JobId, Arc<ActiveJob>>>,
}

/// Batch job scheduler
///
/// Cheap to clone; clones share the same jobs and worker pool.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl JobScheduler {
    pub fn new(
        registry: Arc<ModelRegistry>,
        executor: Arc<TaskExecutor>,
        repo: Arc<dyn JobRepository>,
        ids: Arc<dyn IdProvider>,
        clock: Arc<dyn TimeProvider>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                executor,
                repo,
                ids,
                clock,
                pool: WorkerPool::new(config.worker_pool_width, config.pool_scope),
                retry: RetryPolicy::new(config.retry_base_delay_ms),
                jobs: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.inner.registry
    }

    /// Validate, expand and persist a new pending job
    ///
    /// # Errors
    /// - AppError::Validation naming the offending field; nothing is persisted
    /// - AppError::Database if the job cannot be stored
    pub async fn create_job(&self, spec: JobSpec) -> Result<BatchJob> {
        let planned = expand(&spec, &self.inner.registry, |scan_type| {
            self.inner.executor.supports(scan_type)
        })?;
        let total_tasks = u32::try_from(planned.len())
            .map_err(|_| AppError::validation("models", "job expands to too many tasks"))?;

        let job_id = self.inner.ids.generate_id();
        let now = self.inner.clock.now_millis();
        let scan_types = spec.scan_type.scan_types();
        let tasks: Vec<Task> = planned
            .into_iter()
            .map(|p| {
                Task::new(
                    self.inner.ids.generate_id(),
                    job_id.clone(),
                    p.model,
                    p.app_num,
                    p.scan_type,
                )
            })
            .collect();

        let mut job = BatchJob::new(job_id.clone(), now, spec, total_tasks);
        for scan_type in scan_types {
            job.results_summary
                .by_scan_type
                .entry(scan_type.to_string())
                .or_default();
        }

        self.inner.repo.insert_job(&job, &tasks).await?;
        self.inner
            .jobs
            .write()
            .await
            .insert(job_id.clone(), Arc::new(ActiveJob::new(job.clone(), tasks)));

        info!(job_id = %job_id, total_tasks = total_tasks, "Batch job created");
        Ok(job)
    }

    /// Move a pending job to running and begin dispatching its tasks
    ///
    /// A job that expanded to zero tasks fails immediately.
    pub async fn start_job(&self, job_id: &str) -> Result<BatchJob> {
        let active = self.active(job_id).await?;
        let snapshot = {
            let mut record = active.record.lock().await;
            let now = self.inner.clock.now_millis();
            if record.job.start(now).is_err() {
                return Err(AppError::InvalidState(format!(
                    "Job {} is {}; only pending jobs can be started",
                    job_id, record.job.status
                )));
            }

            if record.tasks.is_empty() {
                warn!(job_id = %job_id, "Job has no tasks, failing");
                record
                    .job
                    .results_summary
                    .errors
                    .push(ErrorEntry::for_job("job expanded to zero tasks"));
                record.job.fail(now)?;
                self.inner.persist(&active, &mut record, None).await;
                self.inner.release(&record).await;
                return Ok(record.job.clone());
            }

            self.inner.persist(&active, &mut record, None).await;
            if record.job.is_terminal() {
                return Ok(record.job.clone());
            }
            record.job.clone()
        };

        info!(
            job_id = %job_id,
            total_tasks = snapshot.progress.total,
            "Batch job started"
        );
        tokio::spawn(Inner::drive(Arc::clone(&self.inner), active));
        Ok(snapshot)
    }

    /// Current snapshot of a job
    pub async fn job_status(&self, job_id: &str) -> Result<BatchJob> {
        if let Some(active) = self.lookup(job_id).await {
            return Ok(active.record.lock().await.job.clone());
        }
        self.inner
            .repo
            .find_job(&job_id.to_string())
            .await?
            .ok_or_else(|| not_found(job_id))
    }

    /// Terminal tasks of a job with their results, in expansion order
    pub async fn export_results(&self, job_id: &str) -> Result<Vec<Task>> {
        if let Some(active) = self.lookup(job_id).await {
            let record = active.record.lock().await;
            return Ok(terminal_tasks(&record.tasks));
        }

        let job_id = job_id.to_string();
        if self.inner.repo.find_job(&job_id).await?.is_none() {
            return Err(not_found(&job_id));
        }
        let tasks = self.inner.repo.find_tasks(&job_id).await?;
        Ok(terminal_tasks(&tasks))
    }

    /// Request cancellation
    ///
    /// Pending tasks are skipped immediately; in-flight tasks are skipped when
    /// they return. The job becomes `cancelled` once nothing is in flight.
    pub async fn cancel_job(&self, job_id: &str) -> Result<BatchJob> {
        let active = self.active(job_id).await?;
        let mut record = active.record.lock().await;
        if record.job.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Job {} is already {}",
                job_id, record.job.status
            )));
        }

        if !record.job.cancel_requested {
            record.job.cancel_requested = true;
            active.cancel.cancel();

            let now = self.inner.clock.now_millis();
            for index in record.skip_pending(now) {
                if let Err(e) = self.inner.repo.update_task(&record.tasks[index]).await {
                    self.inner.bookkeeping_failure(&active, &mut record, e).await;
                    break;
                }
            }
            self.inner.persist(&active, &mut record, None).await;
            info!(
                job_id = %job_id,
                in_flight = record.in_flight,
                "Batch job cancellation requested"
            );
        }

        self.inner.maybe_finish(&active, &mut record).await;
        Ok(record.job.clone())
    }

    /// Cancel every job that is still active (daemon shutdown)
    pub async fn cancel_all(&self) -> usize {
        let job_ids: Vec<JobId> = self.inner.jobs.read().await.keys().cloned().collect();
        let mut cancelled = 0;
        for job_id in job_ids {
            if self.cancel_job(&job_id).await.is_ok() {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Tasks currently executing across all jobs
    pub async fn in_flight_tasks(&self) -> usize {
        let jobs: Vec<Arc<ActiveJob>> = self.inner.jobs.read().await.values().cloned().collect();
        let mut total = 0;
        for job in jobs {
            total += job.record.lock().await.in_flight;
        }
        total
    }

    async fn lookup(&self, job_id: &str) -> Option<Arc<ActiveJob>> {
        self.inner.jobs.read().await.get(job_id).cloned()
    }

    /// In-memory job, loading it from the repository if needed
    async fn active(&self, job_id: &str) -> Result<Arc<ActiveJob>> {
        if let Some(active) = self.lookup(job_id).await {
            return Ok(active);
        }

        let job = self
            .inner
            .repo
            .find_job(&job_id.to_string())
            .await?
            .ok_or_else(|| not_found(job_id))?;
        let tasks = self.inner.repo.find_tasks(&job.id).await?;
        debug!(job_id = %job_id, status = %job.status, "Loaded job from repository");
        if job.is_terminal() {
            return Ok(Arc::new(ActiveJob::new(job, tasks)));
        }

        let mut jobs = self.inner.jobs.write().await;
        let active = jobs
            .entry(job.id.clone())
            .or_insert_with(|| Arc::new(ActiveJob::new(job, tasks)));
        Ok(Arc::clone(active))
    }
}

impl Inner {
    /// Dispatch loop of one running job
    async fn drive(self: Arc<Self>, active: Arc<ActiveJob>) {
        let permits = self.pool.permits_for_job();
        let token = active.cancel.token();
        let (job_id, options, queue) = {
            let record = active.record.lock().await;
            let queue: Vec<usize> = record
                .tasks
                .iter()
                .enumerate()
                .filter(|(_, task)| task.status == TaskStatus::Pending)
                .map(|(index, _)| index)
                .collect();
            (record.job.id.clone(), record.job.options.clone(), queue)
        };

        let mut workers = JoinSet::new();
        for index in queue {
            let permit = tokio::select! {
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = token.cancelled() => break,
            };

            let task = {
                let mut record = active.record.lock().await;
                if record.job.is_terminal() || record.job.cancel_requested {
                    break;
                }
                if record.tasks[index].status != TaskStatus::Pending {
                    continue;
                }
                let now = self.clock.now_millis();
                if let Err(e) = record.tasks[index].start(now) {
                    warn!(job_id = %job_id, error = %e, "Task could not be started");
                    continue;
                }
                record.in_flight += 1;
                self.persist(&active, &mut record, Some(index)).await;
                record.tasks[index].clone()
            };

            debug!(job_id = %job_id, task_id = %task.id, "Task dispatched");
            workers.spawn(Arc::clone(&self).run_worker(
                Arc::clone(&active),
                index,
                task,
                options.clone(),
                permit,
            ));
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(job_id = %job_id, error = %e, "Task worker aborted");
            }
        }

        let mut record = active.record.lock().await;
        self.maybe_finish(&active, &mut record).await;
    }

    /// Execute a task, retrying transient failures, then record its outcome
    async fn run_worker(
        self: Arc<Self>,
        active: Arc<ActiveJob>,
        index: usize,
        mut task: Task,
        options: JobOptions,
        _permit: OwnedSemaphorePermit,
    ) {
        let token = active.cancel.token();
        let outcome = loop {
            task.attempts += 1;
            let outcome = self.execute_isolated(&task, &options, &token).await;

            let decision = match &outcome {
                TaskOutcome::Failed(error) => self.retry.decide(&task, error, options.max_retries),
                _ => RetryDecision::GiveUp,
            };
            match decision {
                RetryDecision::Retry(delay) if !token.is_cancelled() => {
                    let cancelled = tokio::select! {
                        _ = tokio::time::sleep(delay) => false,
                        _ = token.cancelled() => true,
                    };
                    if cancelled {
                        break TaskOutcome::Cancelled;
                    }
                }
                _ => break outcome,
            }
        };

        self.complete(&active, index, task.attempts, outcome).await;
    }

    /// Run the executor on its own tokio task so a panic stays contained
    async fn execute_isolated(
        &self,
        task: &Task,
        options: &JobOptions,
        token: &CancelToken,
    ) -> TaskOutcome {
        let executor = Arc::clone(&self.executor);
        let (task, options, token) = (task.clone(), options.clone(), token.clone());
        let task_id = task.id.clone();

        match tokio::spawn(async move { executor.execute(&task, &options, &token).await }).await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                let message = panic_message(join_error);
                error!(task_id = %task_id, panic_message = %message, "Task panicked");
                TaskOutcome::Failed(TaskError::new(TaskErrorKind::Panicked, message))
            }
        }
    }

    async fn complete(&self, active: &ActiveJob, index: usize, attempts: u32, outcome: TaskOutcome) {
        let mut record = active.record.lock().await;
        record.in_flight = record.in_flight.saturating_sub(1);
        let now = self.clock.now_millis();
        let discard = record.job.cancel_requested || record.job.is_terminal();

        let task = &mut record.tasks[index];
        task.attempts = attempts;
        let transition = if discard {
            task.skip(now, None)
        } else {
            match outcome {
                TaskOutcome::Completed(result) => task.complete(now, result),
                TaskOutcome::Failed(error) => task.fail(now, error),
                TaskOutcome::Cancelled => task.skip(now, None),
            }
        };

        match transition {
            Ok(()) => {
                debug!(
                    task_id = %task.id,
                    status = %task.status,
                    attempts = attempts,
                    "Task finished"
                );
                let JobRecord { job, tasks, .. } = &mut *record;
                ProgressAggregator::merge(job, &tasks[index]);
                self.persist(active, &mut record, Some(index)).await;
            }
            Err(e) => warn!(error = %e, "Task outcome dropped"),
        }

        self.maybe_finish(active, &mut record).await;
    }

    /// Close the job once every task is terminal and nothing is in flight
    async fn maybe_finish(&self, active: &ActiveJob, record: &mut JobRecord) {
        if record.job.is_terminal() {
            self.release(record).await;
            return;
        }
        if record.in_flight > 0 {
            return;
        }
        if record.job.status == BatchStatus::Pending && !record.job.cancel_requested {
            return;
        }
        if !record.tasks.iter().all(Task::is_terminal) {
            return;
        }

        let now = self.clock.now_millis();
        if let Err(e) = record.job.finish(now) {
            warn!(job_id = %record.job.id, error = %e, "Job could not be finished");
            return;
        }
        info!(
            job_id = %record.job.id,
            status = %record.job.status,
            tasks_completed = record.job.results_summary.tasks_completed,
            tasks_failed = record.job.results_summary.tasks_failed,
            tasks_skipped = record.job.results_summary.tasks_skipped,
            "Batch job finished"
        );
        self.persist(active, record, None).await;
        self.release(record).await;
    }

    /// Drop a settled job from the in-memory map
    async fn release(&self, record: &JobRecord) {
        if !record.job.is_terminal() || record.in_flight > 0 || record.persist_failed {
            return;
        }
        if self.jobs.write().await.remove(&record.job.id).is_some() {
            debug!(job_id = %record.job.id, "Released finished job from memory");
        }
    }

    /// Write the job row (and optionally one task row) through the repository
    async fn persist(&self, active: &ActiveJob, record: &mut JobRecord, task_index: Option<usize>) {
        let written = match task_index {
            Some(index) => self.repo.update_task(&record.tasks[index]).await,
            None => Ok(()),
        };
        let written = match written {
            Ok(()) => self.repo.update_job(&record.job).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            self.bookkeeping_failure(active, record, e).await;
        }
    }

    /// A persistence failure fails the job and stops all further work on it
    async fn bookkeeping_failure(&self, active: &ActiveJob, record: &mut JobRecord, cause: AppError) {
        error!(job_id = %record.job.id, error = %cause, "Failed to persist job state");
        record.persist_failed = true;
        if record.job.is_terminal() {
            return;
        }

        let now = self.clock.now_millis();
        record
            .job
            .results_summary
            .errors
            .push(ErrorEntry::for_job(format!("persistence failure: {}", cause)));
        record.skip_pending(now);
        if let Err(e) = record.job.fail(now) {
            warn!(job_id = %record.job.id, error = %e, "Job could not be failed");
        }
        active.cancel.cancel();

        if let Err(e) = self.repo.update_job(&record.job).await {
            warn!(job_id = %record.job.id, error = %e, "Failed job state not persisted");
        }
    }
}

fn terminal_tasks(tasks: &[Task]) -> Vec<Task> {
    tasks.iter().filter(|t| t.is_terminal()).cloned().collect()
}

fn not_found(job_id: &str) -> AppError {
    AppError::NotFound(format!("Job {} not found", job_id))
}

fn panic_message(join_error: JoinError) -> String {
    if !join_error.is_panic() {
        return join_error.to_string();
    }
    let payload = join_error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}
