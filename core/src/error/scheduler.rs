use std::time::Duration;

use thiserror::Error;

use crate::queue::{TaskResult, TaskStatus};

/// Errors raised by the admission, retry and task lifecycle components.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("resource sampling failed: {0}")]
    SamplingFailure(String),

    #[error("invalid transition for task '{task_id}': {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("duplicate task '{name}' in feature '{feature}'")]
    DuplicateTask { feature: String, name: String },

    #[error("task '{task}' failed after {attempts} attempts")]
    RetriesExhausted {
        task: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("admission wait for '{task}' exceeded {waited:?}")]
    AdmissionTimeout { task: String, waited: Duration },

    #[error("attempt for '{task}' exceeded {limit:?}")]
    TaskTimeout { task: String, limit: Duration },

    #[error("cancelled")]
    Cancelled,

    #[error("active window {hour}:00 - {hour}:00 is empty; no task can ever be admitted")]
    EmptyWindow { hour: u32 },

    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),
}

impl SchedulerError {
    /// The failed result of the last attempt, when the chain carries one.
    pub fn last_result(&self) -> Option<&TaskResult> {
        match self {
            Self::RetriesExhausted { source, .. } => source
                .downcast_ref::<AttemptFailed>()
                .map(|failed| &failed.result),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A work function returned `success = false`; carried through the retry
/// chain so the final result can be attached to its execution.
#[derive(Error, Debug)]
#[error("{}", .result.error.as_deref().unwrap_or("task reported failure"))]
pub struct AttemptFailed {
    pub result: TaskResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_result_is_recovered_from_chain() {
        let result = TaskResult::failure("compile error", 1.5);
        let err = SchedulerError::RetriesExhausted {
            task: "auth.login".into(),
            attempts: 3,
            source: anyhow::Error::new(AttemptFailed { result }),
        };

        let last = err.last_result().unwrap();
        assert_eq!(last.error.as_deref(), Some("compile error"));
        assert_eq!(err.to_string(), "task 'auth.login' failed after 3 attempts");
    }

    #[test]
    fn test_last_result_absent_for_raised_errors() {
        let err = SchedulerError::RetriesExhausted {
            task: "auth.login".into(),
            attempts: 1,
            source: anyhow::anyhow!("backend unreachable"),
        };
        assert!(err.last_result().is_none());
        assert!(!err.is_cancelled());
    }
}
