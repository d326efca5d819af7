use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of work belonging to a feature. `feature_name` + `name` is the
/// identity key and never changes once the task is queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub feature_name: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Input/output paths, in order.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub tests: Vec<PathBuf>,
    /// Lower value = served earlier.
    #[serde(default)]
    pub priority: i32,
    /// Opaque to the scheduler; handed through to the work function.
    #[serde(default)]
    pub command: Option<String>,
}

impl Task {
    pub fn new(feature_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            feature_name: feature_name.into(),
            name: name.into(),
            description: String::new(),
            files: Vec::new(),
            tests: Vec::new(),
            priority: 0,
            command: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tests<I, P>(mut self, tests: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.tests = tests.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// `feature_name.name`
    pub fn id(&self) -> String {
        format!("{}.{}", self.feature_name, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of one execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    /// Present iff `success` is false.
    #[serde(default)]
    pub error: Option<String>,
    /// Seconds.
    pub duration: f64,
    /// Empty on failure.
    #[serde(default)]
    pub generated_files: Vec<PathBuf>,
    /// Attempts used by the retry executor to produce this result.
    #[serde(default)]
    pub attempts: u32,
}

impl TaskResult {
    pub fn success(output: impl Into<String>, duration: f64, generated_files: Vec<PathBuf>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            duration,
            generated_files,
            attempts: 1,
        }
    }

    pub fn failure(error: impl Into<String>, duration: f64) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            duration,
            generated_files: Vec::new(),
            attempts: 1,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// One queued instance of a [`Task`], owned by the queue.
#[derive(Debug, Clone, Serialize)]
pub struct TaskExecution {
    pub task_id: String,
    pub task: Task,
    pub state: TaskStatus,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Times this execution was put back into the queue after failing.
    pub attempt_count: u32,
    pub result: Option<TaskResult>,
    pub(crate) seq: u64,
}

impl TaskExecution {
    pub fn feature_name(&self) -> &str {
        &self.task.feature_name
    }

    pub fn task_name(&self) -> &str {
        &self.task.name
    }

    pub fn priority(&self) -> i32 {
        self.task.priority
    }

    /// Duration of the recorded result, if any.
    pub fn duration(&self) -> Option<f64> {
        self.result.as_ref().map(|r| r.duration)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureProgress {
    pub feature: String,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub pending: usize,
    pub total: usize,
    pub progress_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatistics {
    pub total_tasks: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    /// Seconds, averaged over terminal executions with a result.
    pub average_duration: f64,
}
