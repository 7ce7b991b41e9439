// Retry logic for transient task failures
use crate::application::worker::constants::{DEFAULT_RETRY_BASE_DELAY_MS, RETRY_BACKOFF_FACTOR};
use crate::domain::{Task, TaskError};
use std::time::Duration;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run the task again after the backoff delay
    Retry(Duration),
    /// Keep the failure as the task's terminal outcome
    GiveUp,
}

/// Retry policy for task attempts
///
/// Only transient error kinds are retried and only while
/// `attempts <= max_retries`.
pub struct RetryPolicy {
    base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_BASE_DELAY_MS)
    }
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64) -> Self {
        Self { base_delay_ms }
    }

    /// Decide what to do after `task.attempts` executions ended in `error`
    ///
    /// Backoff formula:
    /// delay = base_delay * (2 ^ (attempts - 1)) * (1.0 ± 0.1)
    pub fn decide(&self, task: &Task, error: &TaskError, max_retries: u32) -> RetryDecision {
        if !error.kind.is_transient() {
            return RetryDecision::GiveUp;
        }

        if task.attempts > max_retries {
            if max_retries > 0 {
                warn!(
                    task_id = %task.id,
                    attempts = %task.attempts,
                    max_retries = %max_retries,
                    "Max retry attempts reached"
                );
            }
            return RetryDecision::GiveUp;
        }

        let exponent = task.attempts.saturating_sub(1) as i32;
        let base_delay_ms = self.base_delay_ms as f64 * RETRY_BACKOFF_FACTOR.powi(exponent);

        // Deterministic jitter seeded by the task id
        let jitter_seed = task.id.chars().map(|c| c as u32).sum::<u32>();
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        let delay_ms = (base_delay_ms * jitter_factor) as u64;

        info!(
            task_id = %task.id,
            attempt = %task.attempts,
            kind = %error.kind,
            delay_ms = %delay_ms,
            "Scheduling task retry"
        );

        RetryDecision::Retry(Duration::from_millis(delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ScanType, TaskErrorKind};

    fn task_with_attempts(attempts: u32) -> Task {
        let mut task = Task::new("task-1", "job-1", "Llama", 1, ScanType::Backend);
        task.attempts = attempts;
        task
    }

    #[test]
    fn test_permanent_errors_never_retry() {
        let policy = RetryPolicy::new(1000);
        let error = TaskError::new(TaskErrorKind::AnalyzerFailed, "boom");
        assert_eq!(
            policy.decide(&task_with_attempts(1), &error, 5),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_transient_errors_retry_until_budget_exhausted() {
        let policy = RetryPolicy::new(1000);
        let error = TaskError::new(TaskErrorKind::AnalyzerTimeout, "slow");

        assert!(matches!(
            policy.decide(&task_with_attempts(1), &error, 2),
            RetryDecision::Retry(_)
        ));
        assert!(matches!(
            policy.decide(&task_with_attempts(2), &error, 2),
            RetryDecision::Retry(_)
        ));
        assert_eq!(
            policy.decide(&task_with_attempts(3), &error, 2),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_no_retries_by_default() {
        let policy = RetryPolicy::default();
        let error = TaskError::new(TaskErrorKind::EngineUnavailable, "down");
        assert_eq!(
            policy.decide(&task_with_attempts(1), &error, 0),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_exponential_backoff_with_jitter() {
        let policy = RetryPolicy::new(1000);
        let error = TaskError::new(TaskErrorKind::StepTimeout, "slow");

        let first = match policy.decide(&task_with_attempts(1), &error, 5) {
            RetryDecision::Retry(delay) => delay.as_millis() as u64,
            RetryDecision::GiveUp => panic!("expected retry"),
        };
        let third = match policy.decide(&task_with_attempts(3), &error, 5) {
            RetryDecision::Retry(delay) => delay.as_millis() as u64,
            RetryDecision::GiveUp => panic!("expected retry"),
        };

        assert!((900..=1100).contains(&first), "first delay {}", first);
        assert!((3600..=4400).contains(&third), "third delay {}", third);
    }
}
