//! Daemon settings
//!
//! Optional TOML file (`FLEETSCAN_CONFIG`, default `~/.fleetscan/fleetscan.toml`)
//! layered under `FLEETSCAN_*` environment variables.

use fleetscan_core::application::PoolScope;
use fleetscan_core::domain::ScanType;
use fleetscan_core::error::{AppError, Result};
use fleetscan_infra_system::ModelSource;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "~/.fleetscan/fleetscan.toml";
const ENV_PREFIX: &str = "FLEETSCAN";
pub const CONFIG_PATH_ENV: &str = "FLEETSCAN_CONFIG";

/// External command registered for one scan type
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnalyzerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub db_path: String,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub apps_root: String,
    /// Container engine binary
    pub engine_program: String,
    pub worker_pool_width: usize,
    pub pool_scope: PoolScope,
    pub default_task_timeout_secs: u64,
    pub health_max_retries: u32,
    pub health_retry_delay_ms: u64,
    pub retry_base_delay_ms: u64,
    /// Seconds to wait for in-flight tasks on shutdown
    pub shutdown_grace_secs: u64,
    pub models: Vec<ModelSource>,
    /// Scan type name (`backend`, `frontend`, `custom:<name>`) to command
    pub analyzers: BTreeMap<String, AnalyzerCommand>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            db_path: "~/.fleetscan/fleetscan.db".to_string(),
            rpc_host: "127.0.0.1".to_string(),
            rpc_port: 9627,
            apps_root: "~/.fleetscan/apps".to_string(),
            engine_program: "docker".to_string(),
            worker_pool_width: 4,
            pool_scope: PoolScope::Global,
            default_task_timeout_secs: 300,
            health_max_retries: 15,
            health_retry_delay_ms: 2000,
            retry_base_delay_ms: 1000,
            shutdown_grace_secs: 30,
            models: Vec::new(),
            analyzers: BTreeMap::new(),
        }
    }
}

impl DaemonConfig {
    /// Load from the configured file and the process environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = PathBuf::from(shellexpand::tilde(&path).into_owned());
        Self::load_layered(Some(path), environment())
    }

    fn load_layered(file: Option<PathBuf>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        let loaded: DaemonConfig = builder
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AppError::Config(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<()> {
        if self.worker_pool_width == 0 {
            return Err(AppError::Config("worker_pool_width must be at least 1".into()));
        }
        if self.default_task_timeout_secs == 0 {
            return Err(AppError::Config(
                "default_task_timeout_secs must be positive".into(),
            ));
        }
        if self.models.is_empty() {
            return Err(AppError::Config("at least one model must be configured".into()));
        }
        for (name, command) in &self.analyzers {
            if ScanType::parse(name).is_none() {
                return Err(AppError::Config(format!("unknown analyzer scan type: {}", name)));
            }
            if command.program.trim().is_empty() {
                return Err(AppError::Config(format!("analyzer {} has no program", name)));
            }
        }
        Ok(())
    }

    /// Analyzer commands keyed by parsed scan type
    pub fn analyzer_commands(&self) -> Vec<(ScanType, AnalyzerCommand)> {
        self.analyzers
            .iter()
            .filter_map(|(name, command)| ScanType::parse(name).map(|t| (t, command.clone())))
            .collect()
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}", expand(&self.db_path).display())
    }

    pub fn apps_root(&self) -> PathBuf {
        expand(&self.apps_root)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    const BASIC: &str = r#"
apps_root = "/srv/generated"
pool_scope = "per_job"

[[models]]
name = "Llama"

[[models]]
name = "GPT-4"
app_count = 12

[analyzers.backend]
program = "bandit-runner"
args = ["--json"]

[analyzers."custom:zap"]
program = "zap-baseline"
"#;

    #[test]
    fn test_file_values_and_defaults() {
        let file = write_toml(BASIC);
        let config =
            DaemonConfig::load_layered(Some(file.path().to_path_buf()), env(&[])).unwrap();

        assert_eq!(config.apps_root(), PathBuf::from("/srv/generated"));
        assert_eq!(config.pool_scope, PoolScope::PerJob);
        assert_eq!(config.worker_pool_width, 4);
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.models[0].app_count, None);
        assert_eq!(config.models[1].app_count, Some(12));

        let analyzers = config.analyzer_commands();
        assert_eq!(analyzers.len(), 2);
        assert!(analyzers
            .iter()
            .any(|(t, c)| *t == ScanType::Custom("zap".into()) && c.program == "zap-baseline"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_toml(BASIC);
        let config = DaemonConfig::load_layered(
            Some(file.path().to_path_buf()),
            env(&[
                ("FLEETSCAN_RPC_PORT", "9999"),
                ("FLEETSCAN_WORKER_POOL_WIDTH", "8"),
            ]),
        )
        .unwrap();

        assert_eq!(config.rpc_port, 9999);
        assert_eq!(config.worker_pool_width, 8);
    }

    #[test]
    fn test_missing_models_is_fatal() {
        let err = DaemonConfig::load_layered(None, env(&[])).unwrap_err();
        assert!(matches!(err, AppError::Config(m) if m.contains("model")));
    }

    #[test]
    fn test_unknown_analyzer_scan_type_is_fatal() {
        let file = write_toml(
            r#"
[[models]]
name = "Llama"

[analyzers.fullstack]
program = "scan"
"#,
        );
        let err =
            DaemonConfig::load_layered(Some(file.path().to_path_buf()), env(&[])).unwrap_err();
        assert!(matches!(err, AppError::Config(m) if m.contains("fullstack")));
    }

    #[test]
    fn test_database_url() {
        let config = DaemonConfig {
            db_path: "/var/lib/fleetscan/jobs.db".to_string(),
            ..Default::default()
        };
        assert_eq!(config.database_url(), "sqlite:///var/lib/fleetscan/jobs.db");
    }
}
