use chrono::NaiveDateTime;
use serde::Serialize;

use crate::monitor::SystemSnapshot;

/// Point-in-time scheduler snapshot. Recomputed on every query.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub can_admit: bool,
    pub reason: String,
    pub paused: bool,
    pub running_tasks: usize,
    pub max_concurrent: usize,
    pub available_slots: usize,
    pub within_window: bool,
    pub active_hours: (u32, u32),
    pub next_window_start: Option<NaiveDateTime>,
    /// `None` when the host could not be sampled.
    pub system: Option<SystemSnapshot>,
}
