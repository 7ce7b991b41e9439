// SQLite JobRepository Implementation

use async_trait::async_trait;
use fleetscan_core::domain::{
    BatchJob, BatchStatus, JobId, Progress, ScanType, Task, TaskStatus,
};
use fleetscan_core::error::{AppError, Result};
use fleetscan_core::port::JobRepository;
use sqlx::SqlitePool;

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Database(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "787" | "3850" => AppError::Database(format!(
                        "Foreign key constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        // Connection, pool, protocol errors
        _ => AppError::Database(err.to_string()),
    }
}

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert_job(&self, job: &BatchJob, tasks: &[Task]) -> Result<()> {
        // Job row and all task rows land together or not at all
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO batch_jobs (
                id, name, description, scan_type, models, app_ranges, options,
                status, created_at, started_at, completed_at,
                progress_completed, progress_total, results_summary, cancel_requested
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.name)
        .bind(&job.description)
        .bind(serde_json::to_string(&job.scan_type)?)
        .bind(serde_json::to_string(&job.models)?)
        .bind(serde_json::to_string(&job.app_ranges)?)
        .bind(serde_json::to_string(&job.options)?)
        .bind(job.status.to_string())
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(i64::from(job.progress.completed))
        .bind(i64::from(job.progress.total))
        .bind(serde_json::to_string(&job.results_summary)?)
        .bind(if job.cancel_requested { 1 } else { 0 })
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        for (seq, task) in tasks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO batch_tasks (
                    id, job_id, seq, model, app_num, scan_type, status, attempts,
                    started_at, completed_at, result, error
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&task.id)
            .bind(&task.job_id)
            .bind(seq as i64)
            .bind(&task.model)
            .bind(i64::from(task.app_num))
            .bind(task.scan_type.to_string())
            .bind(task.status.to_string())
            .bind(i64::from(task.attempts))
            .bind(task.started_at)
            .bind(task.completed_at)
            .bind(optional_json(&task.result)?)
            .bind(optional_json(&task.error)?)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update_job(&self, job: &BatchJob) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE batch_jobs
            SET status = ?, started_at = ?, completed_at = ?,
                progress_completed = ?, progress_total = ?,
                results_summary = ?, cancel_requested = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status.to_string())
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(i64::from(job.progress.completed))
        .bind(i64::from(job.progress.total))
        .bind(serde_json::to_string(&job.results_summary)?)
        .bind(if job.cancel_requested { 1 } else { 0 })
        .bind(&job.id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Job {} not found", job.id)));
        }
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE batch_tasks
            SET status = ?, attempts = ?, started_at = ?, completed_at = ?,
                result = ?, error = ?
            WHERE id = ?
            "#,
        )
        .bind(task.status.to_string())
        .bind(i64::from(task.attempts))
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(optional_json(&task.result)?)
        .bind(optional_json(&task.error)?)
        .bind(&task.id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Task {} not found", task.id)));
        }
        Ok(())
    }

    async fn find_job(&self, id: &JobId) -> Result<Option<BatchJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM batch_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn find_tasks(&self, job_id: &JobId) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM batch_tasks WHERE job_id = ? ORDER BY seq ASC")
                .bind(job_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    async fn find_jobs_by_status(&self, status: BatchStatus) -> Result<Vec<BatchJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM batch_jobs
            WHERE status = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }
}

fn optional_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(AppError::from)
}

fn column_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| AppError::Database(format!("Column {} out of range: {}", column, value)))
}

/// SQLite row representation of a batch job
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    name: String,
    description: String,
    scan_type: String,  // JSON
    models: String,     // JSON
    app_ranges: String, // JSON
    options: String,    // JSON
    status: String,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    progress_completed: i64,
    progress_total: i64,
    results_summary: String, // JSON
    cancel_requested: i64,   // SQLite boolean as integer
}

impl JobRow {
    fn into_job(self) -> Result<BatchJob> {
        let status = BatchStatus::parse(&self.status).ok_or_else(|| {
            AppError::Database(format!("Unknown job status '{}' for {}", self.status, self.id))
        })?;

        Ok(BatchJob {
            scan_type: serde_json::from_str(&self.scan_type)?,
            models: serde_json::from_str(&self.models)?,
            app_ranges: serde_json::from_str(&self.app_ranges)?,
            options: serde_json::from_str(&self.options)?,
            status,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            progress: Progress {
                completed: column_u32(self.progress_completed, "progress_completed")?,
                total: column_u32(self.progress_total, "progress_total")?,
            },
            results_summary: serde_json::from_str(&self.results_summary)?,
            cancel_requested: self.cancel_requested != 0,
            id: self.id,
            name: self.name,
            description: self.description,
        })
    }
}

/// SQLite row representation of a task
#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    job_id: String,
    #[allow(dead_code)]
    seq: i64,
    model: String,
    app_num: i64,
    scan_type: String,
    status: String,
    attempts: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    result: Option<String>, // JSON
    error: Option<String>,  // JSON
}

impl TaskRow {
    fn into_task(self) -> Result<Task> {
        let status = TaskStatus::parse(&self.status).ok_or_else(|| {
            AppError::Database(format!("Unknown task status '{}' for {}", self.status, self.id))
        })?;
        let scan_type = ScanType::parse(&self.scan_type).ok_or_else(|| {
            AppError::Database(format!(
                "Unknown scan type '{}' for {}",
                self.scan_type, self.id
            ))
        })?;

        Ok(Task {
            app_num: column_u32(self.app_num, "app_num")?,
            attempts: column_u32(self.attempts, "attempts")?,
            scan_type,
            status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            result: self.result.as_deref().map(serde_json::from_str).transpose()?,
            error: self.error.as_deref().map(serde_json::from_str).transpose()?,
            id: self.id,
            job_id: self.job_id,
            model: self.model,
        })
    }
}
