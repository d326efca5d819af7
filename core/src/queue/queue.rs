use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::transitions::TaskTransition;
use super::types::{
    FeatureProgress, QueueStatistics, Task, TaskExecution, TaskResult, TaskStatus,
};
use crate::error::SchedulerError;

/// Holds every execution across features.
///
/// Executions are never removed once queued; terminal ones stay around for
/// progress and statistics. All mutation goes through the transition methods,
/// so the queue has exactly one owner (the driver) and needs no locking.
#[derive(Debug)]
pub struct TaskQueue {
    executions: Vec<TaskExecution>,
    index: HashMap<String, usize>,
    next_seq: u64,
    max_requeues: u32,
}

impl TaskQueue {
    /// `max_requeues` caps how often `fail(.., retry = true)` puts an
    /// execution back into `PENDING`.
    pub fn new(max_requeues: u32) -> Self {
        Self {
            executions: Vec::new(),
            index: HashMap::new(),
            next_seq: 0,
            max_requeues,
        }
    }

    /// Queue every task of a feature in `PENDING`. The feature priority
    /// overrides whatever priority the tasks carried.
    pub fn enqueue(
        &mut self,
        feature_name: &str,
        tasks: Vec<Task>,
        priority: i32,
    ) -> Result<Vec<String>, SchedulerError> {
        // Reject the whole batch before touching the queue.
        let mut seen = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let id = format!("{}.{}", feature_name, task.name);
            if self.index.contains_key(&id) || seen.contains(&id) {
                return Err(SchedulerError::DuplicateTask {
                    feature: feature_name.to_string(),
                    name: task.name.clone(),
                });
            }
            seen.push(id);
        }

        let now = Utc::now();
        let mut ids = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            task.feature_name = feature_name.to_string();
            task.priority = priority;
            let task_id = task.id();

            self.index.insert(task_id.clone(), self.executions.len());
            self.executions.push(TaskExecution {
                task_id: task_id.clone(),
                task,
                state: TaskStatus::Pending,
                queued_at: now,
                started_at: None,
                finished_at: None,
                attempt_count: 0,
                result: None,
                seq: self.next_seq,
            });
            self.next_seq += 1;
            ids.push(task_id);
        }

        info!(
            feature = feature_name,
            priority,
            count = ids.len(),
            "tasks enqueued"
        );
        Ok(ids)
    }

    /// Highest-precedence `PENDING` execution: lowest priority value, then
    /// enqueue order. Does not change any state.
    pub fn next_pending(&self) -> Option<&TaskExecution> {
        self.executions
            .iter()
            .filter(|e| e.state == TaskStatus::Pending)
            .min_by_key(|e| (e.task.priority, e.seq))
    }

    pub fn start(&mut self, task_id: &str) -> Result<String, SchedulerError> {
        let exec = self.transition(task_id, TaskStatus::Running)?;
        exec.started_at = Some(Utc::now());
        exec.finished_at = None;
        debug!(task_name = %exec.task.name, task_id, "task started");
        Ok(exec.task_id.clone())
    }

    pub fn complete(&mut self, task_id: &str, result: TaskResult) -> Result<(), SchedulerError> {
        let exec = self.transition(task_id, TaskStatus::Completed)?;
        exec.finished_at = Some(Utc::now());
        exec.result = Some(result);
        Ok(())
    }

    /// Mark a running execution failed. With `retry` and budget left it goes
    /// straight back to `PENDING`; otherwise it stays `FAILED`.
    pub fn fail(
        &mut self,
        task_id: &str,
        mut result: TaskResult,
        retry: bool,
    ) -> Result<TaskStatus, SchedulerError> {
        result.success = false;
        result.generated_files.clear();
        if result.error.is_none() {
            result.error = Some("task reported failure".to_string());
        }

        let max_requeues = self.max_requeues;
        let exec = self.transition(task_id, TaskStatus::Failed)?;
        exec.finished_at = Some(Utc::now());
        exec.result = Some(result);

        if retry && exec.attempt_count < max_requeues {
            TaskTransition::validate(task_id, TaskStatus::Failed, TaskStatus::Pending)?;
            exec.state = TaskStatus::Pending;
            exec.attempt_count += 1;
            warn!(
                task_name = %exec.task.name,
                attempt = exec.attempt_count,
                "task failed, requeued"
            );
            return Ok(TaskStatus::Pending);
        }

        warn!(task_name = %exec.task.name, "task failed");
        Ok(TaskStatus::Failed)
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskExecution> {
        self.index.get(task_id).map(|&i| &self.executions[i])
    }

    /// Executions in enqueue order.
    pub fn executions(&self) -> impl Iterator<Item = &TaskExecution> {
        self.executions.iter()
    }

    pub fn feature_progress(&self, feature_name: &str) -> FeatureProgress {
        let mut progress = FeatureProgress {
            feature: feature_name.to_string(),
            completed: 0,
            failed: 0,
            running: 0,
            pending: 0,
            total: 0,
            progress_percent: 0.0,
        };

        for exec in self
            .executions
            .iter()
            .filter(|e| e.task.feature_name == feature_name)
        {
            progress.total += 1;
            match exec.state {
                TaskStatus::Pending => progress.pending += 1,
                TaskStatus::Running => progress.running += 1,
                TaskStatus::Completed => progress.completed += 1,
                TaskStatus::Failed => progress.failed += 1,
            }
        }

        if progress.total > 0 {
            progress.progress_percent = progress.completed as f64 / progress.total as f64 * 100.0;
        }
        progress
    }

    pub fn statistics(&self) -> QueueStatistics {
        let mut stats = QueueStatistics {
            total_tasks: self.executions.len(),
            pending: 0,
            running: 0,
            completed: 0,
            failed: 0,
            average_duration: 0.0,
        };

        let mut duration_sum = 0.0;
        let mut duration_count = 0usize;
        for exec in &self.executions {
            match exec.state {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
            if TaskTransition::is_terminal(exec.state) {
                if let Some(duration) = exec.duration() {
                    duration_sum += duration;
                    duration_count += 1;
                }
            }
        }

        if duration_count > 0 {
            stats.average_duration = duration_sum / duration_count as f64;
        }
        stats
    }

    pub fn running_count(&self) -> usize {
        self.count(TaskStatus::Running)
    }

    pub fn pending_count(&self) -> usize {
        self.count(TaskStatus::Pending)
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    fn count(&self, state: TaskStatus) -> usize {
        self.executions.iter().filter(|e| e.state == state).count()
    }

    fn transition(
        &mut self,
        task_id: &str,
        to: TaskStatus,
    ) -> Result<&mut TaskExecution, SchedulerError> {
        let idx = *self
            .index
            .get(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))?;
        let exec = &mut self.executions[idx];
        TaskTransition::validate(task_id, exec.state, to)?;
        exec.state = to;
        Ok(exec)
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(1)
    }
}
