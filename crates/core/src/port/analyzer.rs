// Analyzer Port - one implementation per scan type

use crate::domain::{AppInstance, Issue, ScanType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Raw analyzer output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub meta: serde_json::Value,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("Analyzer timed out after {0}s")]
    Timeout(u64),

    #[error("Analyzer failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze one app instance
    ///
    /// # Errors
    /// - AnalyzerError::Timeout if the analysis exceeds `timeout`
    /// - AnalyzerError::Failed for any other analyzer failure
    async fn analyze(
        &self,
        instance: &AppInstance,
        options: &serde_json::Value,
        timeout: Duration,
    ) -> Result<AnalysisReport, AnalyzerError>;
}

/// Registered analyzers keyed by scan type
#[derive(Clone, Default)]
pub struct AnalyzerSet {
    analyzers: HashMap<ScanType, Arc<dyn Analyzer>>,
}

impl AnalyzerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, scan_type: ScanType, analyzer: Arc<dyn Analyzer>) -> Self {
        self.register(scan_type, analyzer);
        self
    }

    pub fn register(&mut self, scan_type: ScanType, analyzer: Arc<dyn Analyzer>) {
        self.analyzers.insert(scan_type, analyzer);
    }

    pub fn get(&self, scan_type: &ScanType) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(scan_type).cloned()
    }

    pub fn supports(&self, scan_type: &ScanType) -> bool {
        self.analyzers.contains_key(scan_type)
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock analyzer behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Return these issues
        Issues(Vec<Issue>),
        /// Fail with message
        Fail(String),
        /// Report a timeout
        Timeout,
        /// Panic with message (for panic isolation testing)
        Panic(String),
        /// Sleep for N ms, then return no issues
        Delay(u64),
    }

    /// Mock analyzer with a default behavior and per-app overrides
    pub struct MockAnalyzer {
        default: MockBehavior,
        per_app: Mutex<HashMap<u32, MockBehavior>>,
        calls: AtomicUsize,
        called_apps: Mutex<Vec<u32>>,
    }

    impl MockAnalyzer {
        pub fn new(default: MockBehavior) -> Self {
            Self {
                default,
                per_app: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
                called_apps: Mutex::new(Vec::new()),
            }
        }

        pub fn with_issues(issues: Vec<Issue>) -> Self {
            Self::new(MockBehavior::Issues(issues))
        }

        pub fn for_app(self, app_num: u32, behavior: MockBehavior) -> Self {
            self.per_app.lock().unwrap().insert(app_num, behavior);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn called_apps(&self) -> Vec<u32> {
            self.called_apps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Analyzer for MockAnalyzer {
        async fn analyze(
            &self,
            instance: &AppInstance,
            _options: &serde_json::Value,
            timeout: Duration,
        ) -> Result<AnalysisReport, AnalyzerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.called_apps.lock().unwrap().push(instance.app_num);

            let behavior = self
                .per_app
                .lock()
                .unwrap()
                .get(&instance.app_num)
                .cloned()
                .unwrap_or_else(|| self.default.clone());

            match behavior {
                MockBehavior::Issues(issues) => Ok(AnalysisReport {
                    issues,
                    meta: serde_json::json!({"mock": true}),
                }),
                MockBehavior::Fail(msg) => Err(AnalyzerError::Failed(msg)),
                MockBehavior::Timeout => Err(AnalyzerError::Timeout(timeout.as_secs())),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
                MockBehavior::Delay(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(AnalysisReport::default())
                }
            }
        }
    }
}
