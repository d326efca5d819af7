use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use autodev_core::api::{Task, TaskResult, TaskWork};
use tracing::debug;

/// Dry-run work: waits, then reports success without touching anything.
///
/// Tasks listed in `failing` (by name or `feature.name`) report failure
/// instead, which is handy for rehearsing retry settings.
pub struct SimulatedWork {
    duration: Duration,
    failing: HashSet<String>,
}

impl SimulatedWork {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            failing: HashSet::new(),
        }
    }

    pub fn with_failing<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing = tasks.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl TaskWork for SimulatedWork {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn execute(&self, task: &Task) -> anyhow::Result<TaskResult> {
        let task_id = task.id();
        debug!(task_name = %task_id, "simulating task");
        tokio::time::sleep(self.duration).await;

        let secs = self.duration.as_secs_f64();
        if self.failing.contains(&task.name) || self.failing.contains(&task_id) {
            return Ok(TaskResult::failure(
                format!("simulated failure for {task_id}"),
                secs,
            ));
        }
        Ok(TaskResult::success(
            format!("dry run: {task_id}"),
            secs,
            task.files.clone(),
        ))
    }
}
