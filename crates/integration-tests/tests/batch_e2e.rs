//! Batch jobs end to end against a file-backed SQLite database

mod common;

use std::sync::Arc;

use common::{env, issue, open_repo, spec, wait_terminal};
use fleetscan_core::domain::{BatchStatus, ScanSelection, ScanType, Severity, TaskErrorKind, TaskStatus};
use fleetscan_core::error::AppError;
use fleetscan_core::port::analyzer::mocks::{MockAnalyzer, MockBehavior};
use fleetscan_core::port::{AnalyzerSet, JobRepository};

#[tokio::test]
async fn test_job_completes_and_persists_results() {
    let backend = Arc::new(MockAnalyzer::with_issues(vec![
        issue(Severity::High),
        issue(Severity::Low),
    ]));
    let frontend = Arc::new(MockAnalyzer::with_issues(vec![issue(Severity::Medium)]));
    let analyzers = AnalyzerSet::new()
        .with(ScanType::Backend, backend.clone())
        .with(ScanType::Frontend, frontend.clone());
    let e = env(analyzers, 2).await;

    let job = e
        .scheduler
        .create_job(spec(&["Llama", "GPT-4"], ScanSelection::Both, &[("Llama", "1-2")]))
        .await
        .unwrap();
    // Llama 1-2 and every GPT-4 app, both scan types
    assert_eq!(job.progress.total, 8);
    assert_eq!(job.status, BatchStatus::Pending);

    e.scheduler.start_job(&job.id).await.unwrap();
    let done = wait_terminal(&e.scheduler, &job.id).await;

    assert_eq!(done.status, BatchStatus::Completed);
    assert_eq!(done.progress.completed, 8);
    assert_eq!(done.results_summary.tasks_completed, 8);
    assert_eq!(done.results_summary.severity.high, 4);
    assert_eq!(done.results_summary.severity.medium, 4);
    assert_eq!(done.results_summary.severity.low, 4);
    assert_eq!(done.results_summary.total_issues, 12);
    assert_eq!(done.results_summary.by_scan_type["backend"].total(), 8);
    assert_eq!(done.results_summary.by_scan_type["frontend"].total(), 4);
    assert_eq!(backend.call_count() + frontend.call_count(), 8);

    // the database holds the same picture
    let stored = e.repo.find_job(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BatchStatus::Completed);
    assert_eq!(stored.results_summary, done.results_summary);
    assert!(stored.completed_at.is_some());

    let tasks = e.repo.find_tasks(&job.id).await.unwrap();
    assert_eq!(tasks.len(), 8);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed && t.attempts == 1));
    assert_eq!(
        (tasks[0].model.as_str(), tasks[0].app_num),
        ("Llama", 1),
        "tasks keep expansion order"
    );
}

#[tokio::test]
async fn test_finished_job_readable_after_restart() {
    let analyzers = AnalyzerSet::new().with(
        ScanType::Backend,
        Arc::new(
            MockAnalyzer::with_issues(vec![issue(Severity::High)])
                .for_app(2, MockBehavior::Fail("scanner crashed".into())),
        ),
    );
    let e = env(analyzers, 1).await;
    let job = e
        .scheduler
        .create_job(spec(&["Llama"], ScanSelection::Backend, &[]))
        .await
        .unwrap();
    e.scheduler.start_job(&job.id).await.unwrap();
    let done = wait_terminal(&e.scheduler, &job.id).await;
    assert_eq!(done.status, BatchStatus::Completed);
    assert_eq!(done.results_summary.tasks_failed, 1);

    // a fresh scheduler over the same database falls back to stored rows
    let dir = e.dir;
    e.pool.close().await;
    let restarted = common::env_in(dir, AnalyzerSet::new(), 1).await;

    let status = restarted.scheduler.job_status(&job.id).await.unwrap();
    assert_eq!(status.status, BatchStatus::Completed);
    assert_eq!(status.results_summary.errors.len(), 1);
    assert_eq!(
        status.results_summary.errors[0].kind,
        Some(TaskErrorKind::AnalyzerFailed)
    );

    let exported = restarted.scheduler.export_results(&job.id).await.unwrap();
    assert_eq!(exported.len(), 3);
    let failed = exported.iter().find(|t| t.app_num == 2).unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error.as_ref().unwrap().message.contains("scanner crashed"));
}

#[tokio::test]
async fn test_invalid_range_is_rejected_without_rows() {
    let e = env(
        AnalyzerSet::new().with(ScanType::Backend, Arc::new(MockAnalyzer::with_issues(vec![]))),
        1,
    )
    .await;

    let err = e
        .scheduler
        .create_job(spec(&["Llama"], ScanSelection::Backend, &[("Llama", "3-1")]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "app_ranges.Llama"));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM batch_jobs")
        .fetch_one(&e.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_reopened_database_keeps_pending_job() {
    let e = env(
        AnalyzerSet::new().with(ScanType::Frontend, Arc::new(MockAnalyzer::with_issues(vec![]))),
        1,
    )
    .await;
    let job = e
        .scheduler
        .create_job(spec(&["GPT-4"], ScanSelection::Frontend, &[]))
        .await
        .unwrap();

    let (_pool, repo) = open_repo(e.dir.path()).await;
    let stored = repo.find_job(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BatchStatus::Pending);
    assert_eq!(repo.find_tasks(&job.id).await.unwrap().len(), 2);
}
