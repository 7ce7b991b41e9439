//! Fleetscan Daemon - Main Entry Point
//! Recovery, JSON-RPC job control, graceful shutdown

mod logging;
mod settings;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

// Import workspace crates
use fleetscan_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use fleetscan_core::application::{
    ContainerLifecycleManager, ExecutorSettings, JobScheduler, PortAllocator, RecoveryService,
    SchedulerConfig, TaskExecutor,
};
use fleetscan_core::domain::ModelRegistry;
use fleetscan_core::port::id_provider::UuidProvider;
use fleetscan_core::port::time_provider::SystemTimeProvider;
use fleetscan_core::port::AnalyzerSet;
use fleetscan_infra_sqlite::{create_pool, run_migrations, SqliteJobRepository};
use fleetscan_infra_system::{resolve_models, CommandAnalyzer, DockerCliEngine};
use settings::DaemonConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging (guard flushes the file layer on exit)
    let _log_guard = logging::init();
    info!("Fleetscan daemon v{} starting...", VERSION);

    // 2. Load configuration (invalid config is fatal)
    let config = DaemonConfig::load().context("Invalid configuration")?;
    let apps_root = config.apps_root();

    let entries = resolve_models(&apps_root, &config.models).context("Model catalog")?;
    let registry = Arc::new(ModelRegistry::new(entries).context("Model registry")?);
    info!(
        models = registry.len(),
        apps_root = %apps_root.display(),
        "Model registry loaded"
    );

    // 3. Initialize database
    let database_url = config.database_url();
    info!(database_url = %database_url, "Initializing database...");
    let pool = create_pool(&database_url)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let job_repo = Arc::new(SqliteJobRepository::new(pool.clone()));

    let allocator = Arc::new(PortAllocator::new(registry.clone())?);
    let engine = Arc::new(DockerCliEngine::with_program(config.engine_program.clone()));
    let lifecycle = Arc::new(ContainerLifecycleManager::new(engine, apps_root));

    let mut analyzers = AnalyzerSet::new();
    for (scan_type, command) in config.analyzer_commands() {
        info!(scan_type = %scan_type, program = %command.program, "Registering analyzer");
        analyzers.register(
            scan_type,
            Arc::new(CommandAnalyzer::new(command.program, command.args)),
        );
    }

    let executor_settings = ExecutorSettings {
        task_timeout: Duration::from_secs(config.default_task_timeout_secs),
        health_max_retries: config.health_max_retries,
        health_retry_delay: Duration::from_millis(config.health_retry_delay_ms),
    };
    let executor = Arc::new(TaskExecutor::new(
        allocator.clone(),
        lifecycle.clone(),
        analyzers,
        executor_settings,
    ));

    // 5. Run crash recovery before accepting requests
    info!("Running crash recovery...");
    let recovery = RecoveryService::new(job_repo.clone(), time_provider.clone());
    match recovery.recover_interrupted_jobs().await {
        Ok(count) => info!(recovered_jobs = count, "Crash recovery completed"),
        Err(e) => error!(error = %e, "Crash recovery failed"),
    }

    let scheduler = JobScheduler::new(
        registry,
        executor,
        job_repo,
        Arc::new(UuidProvider),
        time_provider,
        SchedulerConfig {
            worker_pool_width: config.worker_pool_width,
            pool_scope: config.pool_scope,
            retry_base_delay_ms: config.retry_base_delay_ms,
        },
    );

    // 6. Start JSON-RPC server
    let handler = RpcHandler::new(
        scheduler.clone(),
        allocator,
        lifecycle,
        executor_settings.health_max_retries,
        executor_settings.health_retry_delay,
    );
    let rpc_server = RpcServer::new(
        RpcServerConfig {
            host: config.rpc_host.clone(),
            port: config.rpc_port,
        },
        handler,
    );
    let (addr, rpc_handle) = rpc_server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(addr = %addr, "System ready. Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown: stop accepting requests, cancel jobs, drain workers
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;

    let cancelled = scheduler.cancel_all().await;
    info!(cancelled_jobs = cancelled, "Cancellation requested for active jobs");

    let grace = Duration::from_secs(config.shutdown_grace_secs);
    if tokio::time::timeout(grace, drain(&scheduler)).await.is_err() {
        warn!(
            in_flight = scheduler.in_flight_tasks().await,
            "Tasks still running after grace period; they will be recovered on next start"
        );
    }

    pool.close().await;
    info!("Shutdown complete.");
    Ok(())
}

async fn drain(scheduler: &JobScheduler) {
    while scheduler.in_flight_tasks().await > 0 {
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}
