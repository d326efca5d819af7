//! Task state transition rules.

use super::types::TaskStatus;
use crate::error::SchedulerError;

pub struct TaskTransition;

impl TaskTransition {
    pub fn is_valid(from: TaskStatus, to: TaskStatus) -> bool {
        matches!(
            (from, to),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                // explicit requeue
                | (TaskStatus::Failed, TaskStatus::Pending)
        )
    }

    pub fn validate(task_id: &str, from: TaskStatus, to: TaskStatus) -> Result<(), SchedulerError> {
        if Self::is_valid(from, to) {
            Ok(())
        } else {
            Err(SchedulerError::InvalidTransition {
                task_id: task_id.to_string(),
                from,
                to,
            })
        }
    }

    /// `FAILED` counts as terminal: leaving it takes an explicit requeue.
    pub fn is_terminal(state: TaskStatus) -> bool {
        matches!(state, TaskStatus::Completed | TaskStatus::Failed)
    }
}
