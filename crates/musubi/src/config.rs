//! Per-run execution configuration.

use musubi_core::CancellationToken;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bound on node invocations per run.
pub const DEFAULT_MAX_STEPS: usize = 25;

/// Default wall-clock limit for a single step.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounds applied to a run.
///
/// Deserializable so limits can live in a config file; missing fields take
/// their defaults.
///
/// ```
/// use musubi::ExecutionLimits;
/// use std::time::Duration;
///
/// let limits: ExecutionLimits = serde_json::from_str(r#"{ "max_steps": 8 }"#).unwrap();
/// assert_eq!(limits.max_steps, 8);
/// assert_eq!(limits.step_timeout, Some(Duration::from_secs(30)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionLimits {
    /// Maximum number of steps before the run fails with `StepLimitExceeded`.
    pub max_steps: usize,
    /// Wall-clock limit for one step: the node, its merge and its router
    /// together. `None` disables it.
    pub step_timeout: Option<Duration>,
    /// Deadline for the whole run. `None` disables it.
    pub run_timeout: Option<Duration>,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            step_timeout: Some(DEFAULT_STEP_TIMEOUT),
            run_timeout: None,
        }
    }
}

/// Configuration of one `execute` call.
#[derive(Debug, Clone, Default)]
pub struct ExecutionConfig {
    /// Correlation id for tracing. Generated when absent.
    pub correlation_id: Option<String>,
    /// Step and time bounds.
    pub limits: ExecutionLimits,
    /// Caller-owned cancellation token.
    pub cancellation: Option<CancellationToken>,
}

impl ExecutionConfig {
    /// Creates a config with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the correlation id.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Replaces all limits.
    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the step bound.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.limits.max_steps = max_steps;
        self
    }

    /// Sets the per-step timeout.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.limits.step_timeout = Some(timeout);
        self
    }

    /// Disables the per-step timeout.
    pub fn without_step_timeout(mut self) -> Self {
        self.limits.step_timeout = None;
        self
    }

    /// Sets a deadline for the whole run.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.limits.run_timeout = Some(timeout);
        self
    }

    /// Lets the caller cancel the run through `token`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub(crate) fn resolve_correlation_id(&self) -> String {
        self.correlation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.max_steps, 25);
        assert_eq!(limits.step_timeout, Some(Duration::from_secs(30)));
        assert_eq!(limits.run_timeout, None);
    }

    #[test]
    fn test_builder() {
        let config = ExecutionConfig::new()
            .with_correlation_id("req-7")
            .with_max_steps(5)
            .with_step_timeout(Duration::from_millis(100))
            .with_run_timeout(Duration::from_secs(2));

        assert_eq!(config.resolve_correlation_id(), "req-7");
        assert_eq!(config.limits.max_steps, 5);
        assert_eq!(config.limits.step_timeout, Some(Duration::from_millis(100)));
        assert_eq!(config.limits.run_timeout, Some(Duration::from_secs(2)));
        assert!(config.without_step_timeout().limits.step_timeout.is_none());
    }

    #[test]
    fn test_generated_correlation_ids_are_unique() {
        let config = ExecutionConfig::new();
        assert_ne!(config.resolve_correlation_id(), config.resolve_correlation_id());
    }

    #[test]
    fn test_limits_from_json() {
        let limits: ExecutionLimits = serde_json::from_str(
            r#"{ "max_steps": 4, "step_timeout": null, "run_timeout": { "secs": 10, "nanos": 0 } }"#,
        )
        .expect("valid limits");
        assert_eq!(limits.max_steps, 4);
        assert_eq!(limits.step_timeout, None);
        assert_eq!(limits.run_timeout, Some(Duration::from_secs(10)));
    }
}
