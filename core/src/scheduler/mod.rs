//! Admission control: when may the next task start?
//!
//! The [`AdmissionGate`] combines the pause flag, slot availability, the
//! active time window and resource headroom into a single decision. The
//! [`AdaptiveGate`] decorates any [`AdmissionPolicy`] and narrows it further
//! to the hours that historically went well.

mod adaptive;
mod admission;
mod history;
mod slots;
mod status;
mod window;

pub use adaptive::AdaptiveGate;
pub use admission::{AdmissionDecision, AdmissionGate, AdmissionPolicy, DenyReason};
pub use history::{analyze_hours, ExecutionHistory, ExecutionRecord, HourAnalysis, HourStats};
pub use slots::{SlotGuard, SlotManager};
pub use status::SchedulerStatus;
pub use window::TimeWindow;
