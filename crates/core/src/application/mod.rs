// Application Layer - Use Cases and Business Logic

pub mod container_lifecycle;
pub mod port_allocator;
pub mod progress;
pub mod recovery;
pub mod retry;
pub mod scheduler;
pub mod task_executor;
pub mod worker;

// Re-exports
pub use container_lifecycle::{ActionOutcome, ContainerLifecycleManager, HealthReport};
pub use port_allocator::PortAllocator;
pub use progress::ProgressAggregator;
pub use recovery::RecoveryService;
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{JobScheduler, SchedulerConfig};
pub use task_executor::{ExecutorSettings, TaskExecutor, TaskOutcome};
pub use worker::{cancel_channel, CancelHandle, CancelToken, PoolScope, WorkerPool};
