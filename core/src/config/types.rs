use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub adaptive: AdaptiveConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub work: WorkConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.adaptive.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or `~/.autodev/logs` if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "autodev_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Hour range on a 24-hour clock, start inclusive, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHours {
    pub start: u32,
    pub end: u32,
}

impl Default for ActiveHours {
    fn default() -> Self {
        Self { start: 9, end: 18 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub active_hours: ActiveHours,

    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Seconds between readiness checks while waiting for the active window.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Seconds between admission polls while a task waits for a slot.
    #[serde(default = "default_slot_poll_interval")]
    pub slot_poll_interval: u64,

    #[serde(default = "default_threshold")]
    pub cpu_threshold: f32,

    #[serde(default = "default_threshold")]
    pub memory_threshold: f32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds to wait between failed attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// "fixed", "linear" or "exponential-backoff".
    #[serde(default = "default_retry_strategy")]
    pub retry_strategy: String,

    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay: u64,

    /// Upper bound on one admission wait, in seconds. Unbounded when unset.
    #[serde(default)]
    pub admission_timeout: Option<u64>,

    /// Upper bound on one attempt, in seconds. Unbounded when unset.
    #[serde(default)]
    pub task_timeout: Option<u64>,

    /// Put tasks whose retries are exhausted back into the queue.
    #[serde(default)]
    pub requeue_failed: bool,

    #[serde(default = "default_max_requeues")]
    pub max_requeues: u32,
}

fn default_max_concurrent_tasks() -> usize {
    2
}

fn default_check_interval() -> u64 {
    60
}

fn default_slot_poll_interval() -> u64 {
    5
}

fn default_threshold() -> f32 {
    80.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    60
}

fn default_retry_strategy() -> String {
    "fixed".to_string()
}

fn default_max_retry_delay() -> u64 {
    600
}

fn default_max_requeues() -> u32 {
    1
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            active_hours: ActiveHours::default(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            check_interval: default_check_interval(),
            slot_poll_interval: default_slot_poll_interval(),
            cpu_threshold: default_threshold(),
            memory_threshold: default_threshold(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            retry_strategy: default_retry_strategy(),
            max_retry_delay: default_max_retry_delay(),
            admission_timeout: None,
            task_timeout: None,
            requeue_failed: false,
            max_requeues: default_max_requeues(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_concurrent_tasks must be at least 1".into(),
            ));
        }
        if self.active_hours.start >= 24 || self.active_hours.end >= 24 {
            return Err(ConfigError::Invalid(format!(
                "scheduler.active_hours must be within 0..24, got {}-{}",
                self.active_hours.start, self.active_hours.end
            )));
        }
        for (key, value) in [
            ("cpu_threshold", self.cpu_threshold),
            ("memory_threshold", self.memory_threshold),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(ConfigError::Invalid(format!(
                    "scheduler.{key} must be in (0, 100], got {value}"
                )));
            }
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn slot_poll_interval(&self) -> Duration {
        Duration::from_secs(self.slot_poll_interval)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_secs(self.max_retry_delay)
    }

    pub fn admission_timeout(&self) -> Option<Duration> {
        self.admission_timeout.map(Duration::from_secs)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Records required before hours are ranked at all.
    #[serde(default = "default_min_records")]
    pub min_records: usize,

    #[serde(default = "default_top_hours")]
    pub top_hours: usize,
}

fn default_history_capacity() -> usize {
    1000
}

fn default_min_records() -> usize {
    10
}

fn default_top_hours() -> usize {
    8
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            history_capacity: default_history_capacity(),
            min_records: default_min_records(),
            top_hours: default_top_hours(),
        }
    }
}

impl AdaptiveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 || self.top_hours == 0 {
            return Err(ConfigError::Invalid(
                "adaptive.history_capacity and adaptive.top_hours must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// JSONL file holding execution history. Kept in memory only when unset.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkConfig {
    /// Shell command for tasks without their own `command`. Supports the
    /// `{feature}`, `{task}` and `{files}` placeholders.
    #[serde(default)]
    pub command_template: Option<String>,

    /// Directory commands run in. Defaults to the plan file's directory.
    #[serde(default)]
    pub workdir: Option<String>,

    /// Bytes of stdout kept per attempt.
    #[serde(default = "default_output_limit")]
    pub output_limit: usize,

    /// How long one dry-run task takes, in milliseconds.
    #[serde(default = "default_simulated_duration_ms")]
    pub simulated_duration_ms: u64,

    /// Dry-run tasks (by name or `feature.name`) that report failure.
    #[serde(default)]
    pub simulated_failures: Vec<String>,
}

fn default_output_limit() -> usize {
    64 * 1024
}

fn default_simulated_duration_ms() -> u64 {
    200
}

impl Default for WorkConfig {
    fn default() -> Self {
        Self {
            command_template: None,
            workdir: None,
            output_limit: default_output_limit(),
            simulated_duration_ms: default_simulated_duration_ms(),
            simulated_failures: Vec::new(),
        }
    }
}

impl WorkConfig {
    pub fn simulated_duration(&self) -> Duration {
        Duration::from_millis(self.simulated_duration_ms)
    }
}
