mod load;
mod types;

pub use load::{get_autodev_data_dir, load_default, load_from_path};
pub use types::{
    ActiveHours, AdaptiveConfig, AppConfig, HistoryConfig, LoggingConfig, SchedulerConfig, WorkConfig,
};
