pub mod config;
pub mod scheduler;

pub use config::ConfigError;
pub use scheduler::{AttemptFailed, SchedulerError};
