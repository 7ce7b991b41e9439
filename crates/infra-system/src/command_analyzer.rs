// Analyzer adapter backed by an external command
//
// Invocation: `<program> <args...> <model> <app_num> <backend_port> <frontend_port>`
// Options travel as JSON in FLEETSCAN_ANALYZER_OPTIONS; stdout must be an
// AnalysisReport document (`{"issues": [...], "meta": {...}}`).

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use fleetscan_core::domain::AppInstance;
use fleetscan_core::port::analyzer::{AnalysisReport, Analyzer, AnalyzerError};

use crate::process::{run_captured, ProcessError};

pub const ANALYZER_OPTIONS_ENV: &str = "FLEETSCAN_ANALYZER_OPTIONS";

pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
}

impl CommandAnalyzer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn command_for(&self, instance: &AppInstance, options: &serde_json::Value) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&instance.model)
            .arg(instance.app_num.to_string())
            .arg(instance.ports.backend_port.to_string())
            .arg(instance.ports.frontend_port.to_string())
            .env(ANALYZER_OPTIONS_ENV, options.to_string());
        command
    }
}

#[async_trait]
impl Analyzer for CommandAnalyzer {
    async fn analyze(
        &self,
        instance: &AppInstance,
        options: &serde_json::Value,
        timeout: Duration,
    ) -> Result<AnalysisReport, AnalyzerError> {
        debug!(
            program = %self.program,
            model = %instance.model,
            app_num = instance.app_num,
            "Running analyzer command"
        );

        let output = run_captured(self.command_for(instance, options), timeout)
            .await
            .map_err(|e| match e {
                ProcessError::Timeout { .. } => AnalyzerError::Timeout(timeout.as_secs()),
                other => AnalyzerError::Failed(other.to_string()),
            })?;

        if !output.success() {
            let stderr = output.stderr.trim();
            warn!(
                program = %self.program,
                exit_code = ?output.exit_code,
                "Analyzer command failed"
            );
            return Err(AnalyzerError::Failed(format!(
                "{} exited with {:?}: {}",
                self.program,
                output.exit_code,
                if stderr.is_empty() { "no stderr" } else { stderr }
            )));
        }

        serde_json::from_str(output.stdout.trim())
            .map_err(|e| AnalyzerError::Failed(format!("unparsable analyzer output: {}", e)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use fleetscan_core::domain::{PortPair, Severity};

    fn instance() -> AppInstance {
        AppInstance {
            model: "Llama".to_string(),
            model_index: 0,
            app_num: 2,
            ports: PortPair {
                backend_port: 5003,
                frontend_port: 5004,
            },
            project_name: "llama-app2-5003".to_string(),
            backend_container: "llama_app2_backend_5003".to_string(),
            frontend_container: "llama_app2_frontend_5004".to_string(),
        }
    }

    /// `sh -c <script> analyzer <model> <app_num> <bport> <fport>`
    fn script(body: &str) -> CommandAnalyzer {
        CommandAnalyzer::new(
            "sh",
            vec!["-c".to_string(), body.to_string(), "analyzer".to_string()],
        )
    }

    #[tokio::test]
    async fn test_parses_report_and_passes_instance_args() {
        let analyzer = script(
            r#"printf '{"issues":[{"severity":"HIGH","tool":"bandit","message":"app %s port %s"}],"meta":{"model":"%s","frontend":%s}}' "$2" "$3" "$1" "$4""#,
        );

        let report = analyzer
            .analyze(&instance(), &serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].severity, Severity::High);
        assert_eq!(report.issues[0].message, "app 2 port 5003");
        assert_eq!(report.meta["model"], "Llama");
        assert_eq!(report.meta["frontend"], 5004);
    }

    #[tokio::test]
    async fn test_options_passed_through_env() {
        let analyzer = script(r#"printf '{"issues":[],"meta":%s}' "$FLEETSCAN_ANALYZER_OPTIONS""#);

        let report = analyzer
            .analyze(
                &instance(),
                &serde_json::json!({"depth": 3}),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert!(report.issues.is_empty());
        assert_eq!(report.meta["depth"], 3);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let analyzer = script("echo 'tool crashed' 1>&2; exit 2");
        let err = analyzer
            .analyze(&instance(), &serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            AnalyzerError::Failed(message) => assert!(message.contains("tool crashed")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparsable_output_is_failure() {
        let analyzer = script("echo 'not json'");
        let err = analyzer
            .analyze(&instance(), &serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::Failed(m) if m.contains("unparsable")));
    }

    #[tokio::test]
    async fn test_slow_command_times_out() {
        let analyzer = script("exec sleep 10");
        let err = analyzer
            .analyze(&instance(), &serde_json::json!({}), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::Timeout(_)));
    }
}
