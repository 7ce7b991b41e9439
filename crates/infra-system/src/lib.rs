// Fleetscan Infrastructure - System Adapters
// Implements: ContainerEngine, Analyzer (ADR-002)

pub mod app_catalog;
pub mod command_analyzer;
pub mod docker_engine;
pub mod process;

pub use app_catalog::{highest_app_number, resolve_models, ModelSource};
pub use command_analyzer::{CommandAnalyzer, ANALYZER_OPTIONS_ENV};
pub use docker_engine::DockerCliEngine;
pub use process::{run_captured, CapturedOutput, ProcessError};
