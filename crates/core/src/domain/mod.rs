// Domain Layer - Pure business logic and entities

pub mod app_range;
pub mod container;
pub mod error;
pub mod findings;
pub mod job;
pub mod model;
pub mod summary;
pub mod task;

// Re-exports
pub use app_range::{parse_app_range, AppRangeError};
pub use container::{AppInstance, ContainerAction, ContainerStatus, HealthState, PortPair};
pub use error::{ContainerError, DomainError, PortError};
pub use findings::{Issue, Severity, SeverityCounts};
pub use job::{BatchJob, BatchStatus, JobId, JobOptions, JobSpec, Progress, ScanSelection};
pub use model::{ModelEntry, ModelId, ModelRegistry, MAX_APPS_PER_MODEL};
pub use summary::{ErrorEntry, ResultsSummary};
pub use task::{ScanType, Task, TaskError, TaskErrorKind, TaskId, TaskResult, TaskStatus};
