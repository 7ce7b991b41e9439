//! RPC Method Handlers
//!
//! Thin adapters from RPC params to the scheduler and the lifecycle manager.

use crate::error::to_rpc_error;
use crate::types::{
    CancelResponse, ContainerActionRequest, ContainerActionResponse, ContainerHealthRequest,
    ContainerHealthResponse, CreateJobResponse, ExportResponse, JobIdRequest,
};
use fleetscan_core::application::{
    CancelToken, ContainerLifecycleManager, JobScheduler, PortAllocator,
};
use fleetscan_core::domain::{BatchJob, JobSpec};
use fleetscan_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

type RpcResult<T> = Result<T, ErrorObjectOwned>;

/// Health overrides are capped at this multiple of the configured defaults
const HEALTH_OVERRIDE_FACTOR: u32 = 4;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    scheduler: JobScheduler,
    allocator: Arc<PortAllocator>,
    lifecycle: Arc<ContainerLifecycleManager>,
    health_max_retries: u32,
    health_retry_delay: Duration,
}

impl RpcHandler {
    pub fn new(
        scheduler: JobScheduler,
        allocator: Arc<PortAllocator>,
        lifecycle: Arc<ContainerLifecycleManager>,
        health_max_retries: u32,
        health_retry_delay: Duration,
    ) -> Self {
        Self {
            scheduler,
            allocator,
            lifecycle,
            health_max_retries,
            health_retry_delay,
        }
    }

    /// batch.create.v1
    pub async fn create(&self, spec: JobSpec) -> RpcResult<CreateJobResponse> {
        let job = self.scheduler.create_job(spec).await.map_err(to_rpc_error)?;
        Ok(CreateJobResponse {
            job_id: job.id,
            status: job.status,
            total_tasks: job.progress.total,
        })
    }

    /// batch.start.v1
    pub async fn start(&self, params: JobIdRequest) -> RpcResult<BatchJob> {
        self.scheduler
            .start_job(&params.job_id)
            .await
            .map_err(to_rpc_error)
    }

    /// batch.status.v1
    pub async fn status(&self, params: JobIdRequest) -> RpcResult<BatchJob> {
        self.scheduler
            .job_status(&params.job_id)
            .await
            .map_err(to_rpc_error)
    }

    /// batch.cancel.v1
    pub async fn cancel(&self, params: JobIdRequest) -> RpcResult<CancelResponse> {
        let job = self
            .scheduler
            .cancel_job(&params.job_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(CancelResponse {
            job_id: job.id,
            acknowledged: job.cancel_requested,
            status: job.status,
        })
    }

    /// batch.export.v1
    pub async fn export(&self, params: JobIdRequest) -> RpcResult<ExportResponse> {
        let tasks = self
            .scheduler
            .export_results(&params.job_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(ExportResponse {
            job_id: params.job_id,
            tasks,
        })
    }

    /// container.action.v1
    pub async fn container_action(
        &self,
        params: ContainerActionRequest,
    ) -> RpcResult<ContainerActionResponse> {
        let instance = self
            .allocator
            .instance(&params.model, params.app_num)
            .map_err(|e| to_rpc_error(AppError::Port(e)))?;

        info!(
            model = %params.model,
            app_num = params.app_num,
            action = %params.action,
            "Container action requested over RPC"
        );
        let outcome = self.lifecycle.perform(params.action, &instance).await;

        Ok(ContainerActionResponse {
            success: outcome.success,
            output: outcome.output,
            error_kind: outcome.error.as_ref().map(|e| e.kind().to_string()),
            error: outcome.error.map(|e| e.to_string()),
        })
    }

    /// container.health.v1
    pub async fn container_health(
        &self,
        params: ContainerHealthRequest,
    ) -> RpcResult<ContainerHealthResponse> {
        let instance = self
            .allocator
            .instance(&params.model, params.app_num)
            .map_err(|e| to_rpc_error(AppError::Port(e)))?;

        let retry_cap = self.health_max_retries.saturating_mul(HEALTH_OVERRIDE_FACTOR);
        let delay_cap = self.health_retry_delay.saturating_mul(HEALTH_OVERRIDE_FACTOR);
        let max_retries = params
            .max_retries
            .map_or(self.health_max_retries, |requested| requested.min(retry_cap));
        let retry_delay = params
            .retry_delay_ms
            .map(Duration::from_millis)
            .map_or(self.health_retry_delay, |requested| requested.min(delay_cap));

        let report = self
            .lifecycle
            .verify_health(&instance, max_retries, retry_delay, &CancelToken::never())
            .await;

        Ok(ContainerHealthResponse {
            healthy: report.healthy,
            message: report.message,
            polls: report.polls,
            backend: report.backend,
            frontend: report.frontend,
        })
    }
}
