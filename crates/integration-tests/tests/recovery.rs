//! Crash recovery over a database left behind by a killed daemon

mod common;

use std::sync::Arc;

use common::{open_repo, spec};
use fleetscan_core::application::RecoveryService;
use fleetscan_core::domain::{
    BatchJob, BatchStatus, ScanSelection, ScanType, Task, TaskErrorKind, TaskResult, TaskStatus,
};
use fleetscan_core::error::AppError;
use fleetscan_core::port::analyzer::mocks::MockAnalyzer;
use fleetscan_core::port::time_provider::SystemTimeProvider;
use fleetscan_core::port::{AnalyzerSet, JobRepository};

/// Leave a running job behind: one task done, one mid-flight, one untouched
async fn crashed_daemon(dir: &std::path::Path) -> BatchJob {
    let (pool, repo) = open_repo(dir).await;

    let mut job = BatchJob::new("job-crashed", 1_000, spec(&["Llama"], ScanSelection::Backend, &[]), 3);
    let mut tasks: Vec<Task> = (1..=3)
        .map(|app| Task::new(format!("task-{app}"), "job-crashed", "Llama", app, ScanType::Backend))
        .collect();
    repo.insert_job(&job, &tasks).await.unwrap();

    job.start(2_000).unwrap();
    repo.update_job(&job).await.unwrap();

    tasks[0].start(2_100).unwrap();
    tasks[0]
        .complete(2_200, TaskResult::from_issues(vec![], serde_json::json!({})))
        .unwrap();
    job.progress.completed = 1;
    job.results_summary.tasks_completed = 1;
    repo.update_task(&tasks[0]).await.unwrap();
    tasks[1].start(2_300).unwrap();
    repo.update_task(&tasks[1]).await.unwrap();
    repo.update_job(&job).await.unwrap();

    pool.close().await;
    job
}

#[tokio::test]
async fn test_restart_fails_interrupted_job() {
    let dir = tempfile::tempdir().unwrap();
    let job = crashed_daemon(dir.path()).await;

    let (_pool, repo) = open_repo(dir.path()).await;
    let recovery = RecoveryService::new(repo.clone(), Arc::new(SystemTimeProvider));
    assert_eq!(recovery.recover_interrupted_jobs().await.unwrap(), 1);

    let stored = repo.find_job(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BatchStatus::Failed);
    assert_eq!(stored.progress.completed, 3);
    assert_eq!(stored.results_summary.tasks_completed, 1);
    assert_eq!(stored.results_summary.tasks_skipped, 2);
    assert!(stored
        .results_summary
        .errors
        .iter()
        .any(|e| e.task_id.is_none() && e.message.contains("interrupted")));

    let tasks = repo.find_tasks(&job.id).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Completed);
    for task in &tasks[1..] {
        assert_eq!(task.status, TaskStatus::Skipped);
        assert_eq!(task.error.as_ref().unwrap().kind, TaskErrorKind::Interrupted);
    }

    // a second pass finds nothing left to recover
    assert_eq!(recovery.recover_interrupted_jobs().await.unwrap(), 0);
}

#[tokio::test]
async fn test_recovered_job_cannot_be_restarted() {
    let dir = tempfile::tempdir().unwrap();
    let job = crashed_daemon(dir.path()).await;
    {
        let (pool, repo) = open_repo(dir.path()).await;
        RecoveryService::new(repo, Arc::new(SystemTimeProvider))
            .recover_interrupted_jobs()
            .await
            .unwrap();
        pool.close().await;
    }

    let analyzers =
        AnalyzerSet::new().with(ScanType::Backend, Arc::new(MockAnalyzer::with_issues(vec![])));
    let e = common::env_in(dir, analyzers, 1).await;

    let status = e.scheduler.job_status(&job.id).await.unwrap();
    assert_eq!(status.status, BatchStatus::Failed);

    let err = e.scheduler.start_job(&job.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn test_pending_jobs_survive_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let (_pool, repo) = open_repo(dir.path()).await;

    let job = BatchJob::new("job-pending", 1_000, spec(&["GPT-4"], ScanSelection::Frontend, &[]), 2);
    let tasks: Vec<Task> = (1..=2)
        .map(|app| Task::new(format!("p-{app}"), "job-pending", "GPT-4", app, ScanType::Frontend))
        .collect();
    repo.insert_job(&job, &tasks).await.unwrap();

    let recovery = RecoveryService::new(repo.clone(), Arc::new(SystemTimeProvider));
    assert_eq!(recovery.recover_interrupted_jobs().await.unwrap(), 0);

    let stored = repo.find_job(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BatchStatus::Pending);
}
