// Worker pool - bounds concurrent task execution

mod cancel;
pub mod constants;

pub use cancel::{cancel_channel, CancelHandle, CancelToken};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

/// Whether the width bound is shared by all jobs or applied per job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolScope {
    #[default]
    Global,
    PerJob,
}

/// Permit source for task workers
///
/// A worker holds one permit for the whole time it executes a task
/// (container actions, health polling and the analyzer call).
pub struct WorkerPool {
    width: usize,
    scope: PoolScope,
    global: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(width: usize, scope: PoolScope) -> Self {
        let width = width.max(1);
        info!(width = width, scope = ?scope, "Worker pool configured");
        Self {
            width,
            scope,
            global: Arc::new(Semaphore::new(width)),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn scope(&self) -> PoolScope {
        self.scope
    }

    /// Semaphore a newly started job draws its permits from
    pub fn permits_for_job(&self) -> Arc<Semaphore> {
        match self.scope {
            PoolScope::Global => Arc::clone(&self.global),
            PoolScope::PerJob => Arc::new(Semaphore::new(self.width)),
        }
    }
}
