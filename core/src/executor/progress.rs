use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::queue::{FeatureProgress, TaskStatus};

/// Terminal progress for one feature: an overall bar plus a spinner per
/// running task. Every method is a no-op when disabled.
pub struct ProgressMonitor {
    multi: MultiProgress,
    overall: ProgressBar,
    task_bars: HashMap<String, ProgressBar>,
    enabled: bool,
}

impl ProgressMonitor {
    pub fn new(feature: &str, total_tasks: usize, enabled: bool) -> Self {
        if !enabled {
            return Self {
                multi: MultiProgress::new(),
                overall: ProgressBar::hidden(),
                task_bars: HashMap::new(),
                enabled: false,
            };
        }

        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(total_tasks as u64));
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {prefix} {bar:40.cyan/blue} {pos}/{len} tasks {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░  ");
        overall.set_style(style);
        overall.set_prefix(feature.to_string());

        Self {
            multi,
            overall,
            task_bars: HashMap::new(),
            enabled: true,
        }
    }

    pub fn task_started(&mut self, task_id: &str) {
        if !self.enabled {
            return;
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        let style = ProgressStyle::default_spinner()
            .template("  {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        bar.set_style(style);
        bar.set_message(format!("⏳ {task_id}"));
        bar.enable_steady_tick(Duration::from_millis(100));
        self.task_bars.insert(task_id.to_string(), bar);
    }

    /// `status` is where the execution landed; a requeued task does not
    /// advance the overall bar.
    pub fn task_finished(&mut self, task_id: &str, status: TaskStatus, duration: f64) {
        if !self.enabled {
            return;
        }

        let icon = match status {
            TaskStatus::Completed => "✅",
            TaskStatus::Pending => "↻",
            _ => "❌",
        };
        if let Some(bar) = self.task_bars.remove(task_id) {
            bar.finish_with_message(format!("{icon} {task_id} ({duration:.1}s)"));
        }
        if status != TaskStatus::Pending {
            self.overall.inc(1);
        }
    }

    pub fn set_message(&self, msg: &str) {
        if self.enabled {
            self.overall.set_message(msg.to_string());
        }
    }

    pub fn finish(&self, progress: &FeatureProgress) {
        if !self.enabled {
            return;
        }

        let msg = if progress.failed == 0 && progress.completed == progress.total {
            "✅ done".to_string()
        } else {
            format!("❌ {} failed", progress.failed)
        };
        self.overall.finish_with_message(msg);
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        for (_, bar) in self.task_bars.drain() {
            bar.finish_and_clear();
        }
    }
}
