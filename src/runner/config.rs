//! Runner configuration.

use crate::retry::RetryPolicy;
use std::time::Duration;

/// Categories whose initial state is never checked by the setup
/// inspector: their tasks start from a bare desktop on purpose.
pub const DEFAULT_SETUP_CHECK_SKIP: &[&str] = &[
    "file_explorer",
    "settings",
    "microsoft_paint",
    "notepad",
];

/// Knobs for the episode runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Step budget for one episode. The session itself has no budget;
    /// the runner owns the outer loop.
    pub max_steps: u64,
    /// Whether to run the setup inspector against the first frame and
    /// bail out with the distinguished setup-failure status on error.
    pub check_setup: bool,
    /// Categories exempt from the setup check.
    pub setup_check_skip: Vec<String>,
    /// Retry budget for flaky upstream calls (policy, setup inspector).
    pub upstream_retry: RetryPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            check_setup: false,
            setup_check_skip: DEFAULT_SETUP_CHECK_SKIP.iter().map(|s| s.to_string()).collect(),
            upstream_retry: RetryPolicy::new(3, Duration::from_secs(2)),
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_check_setup(mut self, check_setup: bool) -> Self {
        self.check_setup = check_setup;
        self
    }

    pub fn with_upstream_retry(mut self, policy: RetryPolicy) -> Self {
        self.upstream_retry = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RunnerConfig::default();
        assert_eq!(config.max_steps, 20);
        assert!(!config.check_setup);
        assert!(config.setup_check_skip.contains(&"notepad".to_string()));
    }

    #[test]
    fn builder_overrides() {
        let config = RunnerConfig::new()
            .with_max_steps(5)
            .with_check_setup(true)
            .with_upstream_retry(RetryPolicy::new(1, Duration::ZERO));
        assert_eq!(config.max_steps, 5);
        assert!(config.check_setup);
        assert_eq!(config.upstream_retry.attempts, 1);
    }
}
