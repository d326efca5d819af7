use async_trait::async_trait;

use crate::queue::{Task, TaskResult};

/// The work performed for one task attempt.
///
/// Expected failures come back as `Ok` with `success = false` and `error`
/// set. `Err` is reserved for exceptional conditions; the retry executor
/// counts both as a failed attempt.
#[async_trait]
pub trait TaskWork: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, task: &Task) -> anyhow::Result<TaskResult>;
}
