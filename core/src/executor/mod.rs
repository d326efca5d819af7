//! Task execution: retries under admission control and the feature driver.
//!
//! ```text
//! Feature ──enqueue──▶ TaskQueue ──next_pending/start──▶ FeatureDriver
//!                                                          │ spawn (≤ max_slots)
//!                                                          ▼
//!                                   RetryExecutor::run_task
//!                                     admit ─▶ SlotGuard ─▶ TaskWork::execute
//!                                     └─ failed? delay ─▶ admit again
//!                                                          │
//! TaskQueue ◀──complete/fail──────────────────────────────┘
//! ```

mod driver;
mod progress;
mod retry;
pub mod traits;
pub mod types;

pub use driver::FeatureDriver;
pub use progress::ProgressMonitor;
pub use retry::RetryExecutor;
pub use traits::{AttemptObserver, HistorySink, RetryStrategyPlugin, TaskWork};
pub use types::{Feature, RunSummary};
