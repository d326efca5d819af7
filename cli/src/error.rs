use autodev_core::api::{ConfigError, SchedulerError};
use autodev_plugins::plan::PlanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0:#}")]
    Anyhow(#[from] anyhow::Error),
}

pub const EXIT_OK: i32 = 0;
pub const EXIT_TASKS_FAILED: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_CANCELLED: i32 = 130;

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Plan(_) => EXIT_CONFIG,
            CliError::Scheduler(e) if e.is_cancelled() => EXIT_CANCELLED,
            CliError::Scheduler(
                SchedulerError::InvalidConfig(_) | SchedulerError::EmptyWindow { .. },
            ) => EXIT_CONFIG,
            CliError::Scheduler(_) => EXIT_TASKS_FAILED,
            CliError::Command(_) | CliError::Io(_) | CliError::Json(_) | CliError::Anyhow(_) => {
                EXIT_TASKS_FAILED
            }
        }
    }
}
