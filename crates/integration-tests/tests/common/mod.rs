//! Shared wiring for the end-to-end tests: real SQLite, fake engine and analyzers

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fleetscan_core::application::{
    ContainerLifecycleManager, ExecutorSettings, JobScheduler, PoolScope, PortAllocator,
    SchedulerConfig, TaskExecutor,
};
use fleetscan_core::domain::{
    BatchJob, Issue, JobOptions, JobSpec, ModelEntry, ModelRegistry, ScanSelection, Severity,
};
use fleetscan_core::port::container_engine::mocks::ScriptedEngine;
use fleetscan_core::port::id_provider::UuidProvider;
use fleetscan_core::port::time_provider::SystemTimeProvider;
use fleetscan_core::port::AnalyzerSet;
use fleetscan_infra_sqlite::{create_pool, run_migrations, SqliteJobRepository};
use sqlx::SqlitePool;
use tempfile::TempDir;

pub struct Env {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub repo: Arc<SqliteJobRepository>,
    pub engine: Arc<ScriptedEngine>,
    pub scheduler: JobScheduler,
}

pub fn registry() -> Arc<ModelRegistry> {
    Arc::new(
        ModelRegistry::new(vec![ModelEntry::new("Llama", 3), ModelEntry::new("GPT-4", 2)])
            .unwrap(),
    )
}

pub fn database_url(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("fleetscan.db").display())
}

/// Open (or reopen) the database under `dir`
pub async fn open_repo(dir: &Path) -> (SqlitePool, Arc<SqliteJobRepository>) {
    let pool = create_pool(&database_url(dir)).await.unwrap();
    run_migrations(&pool).await.unwrap();
    let repo = Arc::new(SqliteJobRepository::new(pool.clone()));
    (pool, repo)
}

pub async fn env(analyzers: AnalyzerSet, width: usize) -> Env {
    let dir = tempfile::tempdir().unwrap();
    env_in(dir, analyzers, width).await
}

pub async fn env_in(dir: TempDir, analyzers: AnalyzerSet, width: usize) -> Env {
    let (pool, repo) = open_repo(dir.path()).await;
    let registry = registry();
    let allocator = Arc::new(PortAllocator::new(registry.clone()).unwrap());
    let engine = Arc::new(ScriptedEngine::new());
    let lifecycle = Arc::new(ContainerLifecycleManager::new(
        engine.clone(),
        dir.path().join("apps"),
    ));
    let executor = Arc::new(TaskExecutor::new(
        allocator,
        lifecycle,
        analyzers,
        ExecutorSettings {
            task_timeout: Duration::from_secs(5),
            health_max_retries: 3,
            health_retry_delay: Duration::from_millis(5),
        },
    ));
    let scheduler = JobScheduler::new(
        registry,
        executor,
        repo.clone(),
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
        SchedulerConfig {
            worker_pool_width: width,
            pool_scope: PoolScope::Global,
            retry_base_delay_ms: 5,
        },
    );
    Env {
        dir,
        pool,
        repo,
        engine,
        scheduler,
    }
}

pub fn spec(models: &[&str], scan_type: ScanSelection, ranges: &[(&str, &str)]) -> JobSpec {
    JobSpec {
        name: "e2e".to_string(),
        description: "end-to-end run".to_string(),
        scan_type,
        models: models.iter().map(|m| m.to_string()).collect(),
        app_ranges: ranges
            .iter()
            .map(|(m, r)| (m.to_string(), r.to_string()))
            .collect::<BTreeMap<_, _>>(),
        options: JobOptions::default(),
    }
}

pub fn issue(severity: Severity) -> Issue {
    Issue {
        severity,
        tool: "bandit".to_string(),
        message: "finding".to_string(),
        file: None,
        line: None,
    }
}

pub async fn wait_terminal(scheduler: &JobScheduler, job_id: &str) -> BatchJob {
    for _ in 0..1000 {
        let job = scheduler.job_status(job_id).await.unwrap();
        if job.is_terminal() && scheduler.in_flight_tasks().await == 0 {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not reach a terminal status", job_id);
}
