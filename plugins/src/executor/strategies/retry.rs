use std::time::Duration;

use autodev_core::api::{RetryStrategyPlugin, SchedulerConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Cap for the growing strategies.
    pub max_delay: Duration,
}

impl RetryConfig {
    pub fn from_scheduler(cfg: &SchedulerConfig) -> Self {
        Self {
            max_attempts: cfg.max_retries.max(1),
            base_delay: cfg.retry_delay(),
            max_delay: cfg.max_retry_delay(),
        }
    }
}

/// Waits `base_delay` after every failure.
pub struct FixedDelayPlugin {
    config: RetryConfig,
}

/// Waits `base_delay * attempt`.
pub struct LinearRetryPlugin {
    config: RetryConfig,
}

/// Waits `base_delay * 2^(attempt - 1)`.
pub struct ExponentialBackoffPlugin {
    config: RetryConfig,
}

impl FixedDelayPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl LinearRetryPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl ExponentialBackoffPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

fn scaled(base: Duration, factor: u64, cap: Duration) -> Duration {
    let millis = (base.as_millis() as u64).saturating_mul(factor);
    Duration::from_millis(millis).min(cap)
}

impl RetryStrategyPlugin for FixedDelayPlugin {
    fn name(&self) -> &str {
        "fixed"
    }

    fn next_delay(&self, attempt: u32, _error: &str) -> Option<Duration> {
        (attempt < self.config.max_attempts).then_some(self.config.base_delay)
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

impl RetryStrategyPlugin for LinearRetryPlugin {
    fn name(&self) -> &str {
        "linear"
    }

    fn next_delay(&self, attempt: u32, _error: &str) -> Option<Duration> {
        if attempt >= self.config.max_attempts {
            return None;
        }
        Some(scaled(
            self.config.base_delay,
            attempt.max(1) as u64,
            self.config.max_delay,
        ))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

impl RetryStrategyPlugin for ExponentialBackoffPlugin {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn next_delay(&self, attempt: u32, _error: &str) -> Option<Duration> {
        if attempt >= self.config.max_attempts {
            return None;
        }
        let exp = 1u64 << attempt.saturating_sub(1).min(30);
        Some(scaled(self.config.base_delay, exp, self.config.max_delay))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}
