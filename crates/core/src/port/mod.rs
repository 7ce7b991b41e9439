// Port Layer - Interfaces for external dependencies

pub mod analyzer;
pub mod container_engine;
pub mod id_provider; // For deterministic testing
pub mod job_repository;
pub mod time_provider;

// Re-exports
pub use analyzer::{AnalysisReport, Analyzer, AnalyzerError, AnalyzerSet};
pub use container_engine::{ContainerEngine, EngineError, StepOutput};
pub use id_provider::IdProvider;
pub use job_repository::JobRepository;
pub use time_provider::TimeProvider;
