//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `autodev_core::api` instead of reaching into internal modules.

pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::config::{
    get_autodev_data_dir, load_default, load_from_path, ActiveHours, AdaptiveConfig, AppConfig,
    HistoryConfig, LoggingConfig, SchedulerConfig, WorkConfig,
};
pub use crate::error::{AttemptFailed, ConfigError, SchedulerError};
pub use crate::executor::{
    AttemptObserver, Feature, FeatureDriver, HistorySink, ProgressMonitor, RetryExecutor,
    RetryStrategyPlugin, RunSummary, TaskWork,
};
pub use crate::monitor::{FixedProbe, ResourceProbe, ResourceReading, SysinfoMonitor, SystemSnapshot};
pub use crate::queue::{
    FeatureProgress, QueueStatistics, Task, TaskExecution, TaskQueue, TaskResult, TaskStatus,
};
pub use crate::report::{
    format_duration, render_analysis, render_plan, render_progress_line, render_statistics,
    render_status, render_summary, OutputFormat, ESTIMATED_SECONDS_PER_TASK,
};
pub use crate::scheduler::{
    analyze_hours, AdaptiveGate, AdmissionDecision, AdmissionGate, AdmissionPolicy, DenyReason,
    ExecutionHistory, ExecutionRecord, HourAnalysis, HourStats, SchedulerStatus, SlotGuard,
    SlotManager, TimeWindow,
};
