//! JSON-RPC Server
//!
//! Serves the batch and container control methods over TCP on localhost
//! (jsonrpsee has no Unix socket transport).

use crate::handler::RpcHandler;
use crate::types::{method, ContainerActionRequest, ContainerHealthRequest, JobIdRequest};
use fleetscan_core::domain::JobSpec;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

// ADR-020: RPC Server Configuration
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9627;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    /// 0 picks a free port
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: RpcHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Bind and start serving; returns the bound address and the stop handle
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let module = build_module(self.handler)?;

        info!(addr = %local_addr, "JSON-RPC server started");
        Ok((local_addr, server.start(module)))
    }
}

/// Register every method against `handler`
pub fn build_module(handler: Arc<RpcHandler>) -> Result<RpcModule<()>, String> {
    let mut module = RpcModule::new(());

    let h = handler.clone();
    module.register_async_method(method::BATCH_CREATE, move |params, _, _| {
        let handler = h.clone();
        async move {
            let spec: JobSpec = params.parse()?;
            handler.create(spec).await
        }
    })
    .map_err(|e| e.to_string())?;

    let h = handler.clone();
    module.register_async_method(method::BATCH_START, move |params, _, _| {
        let handler = h.clone();
        async move {
            let req: JobIdRequest = params.parse()?;
            handler.start(req).await
        }
    })
    .map_err(|e| e.to_string())?;

    let h = handler.clone();
    module.register_async_method(method::BATCH_STATUS, move |params, _, _| {
        let handler = h.clone();
        async move {
            let req: JobIdRequest = params.parse()?;
            handler.status(req).await
        }
    })
    .map_err(|e| e.to_string())?;

    let h = handler.clone();
    module.register_async_method(method::BATCH_CANCEL, move |params, _, _| {
        let handler = h.clone();
        async move {
            let req: JobIdRequest = params.parse()?;
            handler.cancel(req).await
        }
    })
    .map_err(|e| e.to_string())?;

    let h = handler.clone();
    module.register_async_method(method::BATCH_EXPORT, move |params, _, _| {
        let handler = h.clone();
        async move {
            let req: JobIdRequest = params.parse()?;
            handler.export(req).await
        }
    })
    .map_err(|e| e.to_string())?;

    let h = handler.clone();
    module.register_async_method(method::CONTAINER_ACTION, move |params, _, _| {
        let handler = h.clone();
        async move {
            let req: ContainerActionRequest = params.parse()?;
            handler.container_action(req).await
        }
    })
    .map_err(|e| e.to_string())?;

    let h = handler;
    module.register_async_method(method::CONTAINER_HEALTH, move |params, _, _| {
        let handler = h.clone();
        async move {
            let req: ContainerHealthRequest = params.parse()?;
            handler.container_health(req).await
        }
    })
    .map_err(|e| e.to_string())?;

    Ok(module)
}
