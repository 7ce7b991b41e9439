// Worker constants (ADR: No magic values)
use std::time::Duration;

/// Analyzer timeout when the job does not override it (5 minutes)
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);

/// Health polls before a container pair is declared not ready
pub const DEFAULT_HEALTH_MAX_RETRIES: u32 = 15;

/// Sleep between health polls (2s)
pub const DEFAULT_HEALTH_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Concurrent tasks per pool
pub const DEFAULT_WORKER_POOL_WIDTH: usize = 4;

/// Default retry base delay (1000ms = 1s)
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Exponential backoff factor between task attempts
pub const RETRY_BACKOFF_FACTOR: f64 = 2.0;
