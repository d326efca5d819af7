//! Task queue and per-task lifecycle.
//!
//! ```text
//! PENDING ──start──▶ RUNNING ──complete──▶ COMPLETED
//!    ▲                  │
//!    └──requeue── FAILED ◀──fail──┘
//! ```

mod queue;
mod transitions;
mod types;

pub use queue::TaskQueue;
pub use transitions::TaskTransition;
pub use types::{
    FeatureProgress, QueueStatistics, Task, TaskExecution, TaskResult, TaskStatus,
};
