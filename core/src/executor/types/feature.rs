use serde::Serialize;

use crate::queue::Task;

/// A named group of tasks sharing one priority.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    pub name: String,
    pub description: String,
    /// Lower value = processed earlier.
    pub priority: i32,
    pub tasks: Vec<Task>,
}

impl Feature {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            priority,
            tasks: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The task adopts this feature's name and priority.
    pub fn with_task(mut self, mut task: Task) -> Self {
        task.feature_name = self.name.clone();
        task.priority = self.priority;
        self.tasks.push(task);
        self
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}
