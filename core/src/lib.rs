//! Execution-admission and task-lifecycle core for autodev.
//!
//! Tasks are grouped into features, queued by priority, and admitted only
//! while the active window is open, the host is idle and a concurrency slot
//! is free. Failed attempts are retried with a configurable delay.

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod queue;
pub mod report;
pub mod scheduler;
