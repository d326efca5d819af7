//! Human and machine renderings of scheduler state.
//!
//! Every `render_*` function returns the full text to print; JSON output is
//! pretty-printed and stable enough to pipe into `jq`.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::executor::{Feature, RunSummary};
use crate::queue::{FeatureProgress, QueueStatistics};
use crate::scheduler::{HourAnalysis, SchedulerStatus};

/// Planning estimate used by the plan table.
pub const ESTIMATED_SECONDS_PER_TASK: u64 = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format '{other}' (expected text or json)")),
        }
    }
}

pub fn render_status(
    status: &SchedulerStatus,
    format: OutputFormat,
) -> Result<String, serde_json::Error> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(status);
    }

    let mut out = String::new();
    let verdict = if status.can_admit { "✅" } else { "⏸" };
    let _ = writeln!(out, "{verdict} {}", status.reason);
    let _ = writeln!(
        out,
        "  active hours:  {:02}:00 - {:02}:00 ({})",
        status.active_hours.0,
        status.active_hours.1,
        if status.within_window { "open" } else { "closed" }
    );
    if !status.within_window {
        match status.next_window_start {
            Some(next) => {
                let _ = writeln!(out, "  next window:   {}", next.format("%Y-%m-%d %H:%M"));
            }
            None => {
                let _ = writeln!(out, "  next window:   never (empty window)");
            }
        }
    }
    let _ = writeln!(
        out,
        "  slots:         {}/{} running, {} available",
        status.running_tasks, status.max_concurrent, status.available_slots
    );
    if status.paused {
        let _ = writeln!(out, "  paused:        yes");
    }
    match &status.system {
        Some(sys) => {
            let _ = writeln!(out, "  platform:      {} ({} cpus)", sys.platform, sys.cpu_count);
            let _ = writeln!(out, "  cpu:           {:.1}%", sys.cpu_percent);
            let _ = writeln!(
                out,
                "  memory:        {:.1}% ({:.1} GB free of {:.1} GB)",
                sys.memory_percent,
                sys.memory_available_gb(),
                sys.memory_total_gb()
            );
        }
        None => {
            let _ = writeln!(out, "  system:        unavailable");
        }
    }
    Ok(out)
}

pub fn render_progress_line(progress: &FeatureProgress) -> String {
    format!(
        "{:<24} {:>3}/{:<3} done  {:>3} failed  {:>5.1}%",
        progress.feature,
        progress.completed,
        progress.total,
        progress.failed,
        progress.progress_percent
    )
}

pub fn render_statistics(stats: &QueueStatistics) -> String {
    format!(
        "{} tasks: {} completed, {} failed, {} pending, avg {:.1}s",
        stats.total_tasks, stats.completed, stats.failed, stats.pending, stats.average_duration
    )
}

pub fn render_summary(
    summary: &RunSummary,
    format: OutputFormat,
) -> Result<String, serde_json::Error> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(summary);
    }

    let mut out = String::new();
    for progress in &summary.features {
        let _ = writeln!(out, "{}", render_progress_line(progress));
    }
    let _ = writeln!(out, "{}", render_statistics(&summary.statistics));
    let _ = writeln!(out, "elapsed {}", format_duration(summary.elapsed as u64));
    if summary.cancelled {
        let _ = writeln!(out, "run cancelled");
    }
    Ok(out)
}

pub fn render_plan(features: &[Feature], format: OutputFormat) -> Result<String, serde_json::Error> {
    let total_tasks: usize = features.iter().map(Feature::task_count).sum();
    let estimate = |tasks: usize| tasks as u64 * ESTIMATED_SECONDS_PER_TASK;

    if format == OutputFormat::Json {
        let rows: Vec<_> = features
            .iter()
            .map(|f| {
                json!({
                    "name": f.name,
                    "priority": f.priority,
                    "tasks": f.task_count(),
                    "estimated_seconds": estimate(f.task_count()),
                })
            })
            .collect();
        return serde_json::to_string_pretty(&json!({
            "features": rows,
            "total_tasks": total_tasks,
            "estimated_seconds": estimate(total_tasks),
        }));
    }

    let mut out = String::new();
    let _ = writeln!(out, "{:<4} {:<28} {:>5} {:>10}", "P", "FEATURE", "TASKS", "ESTIMATE");
    for f in features {
        let _ = writeln!(
            out,
            "{:<4} {:<28} {:>5} {:>10}",
            f.priority,
            f.name,
            f.task_count(),
            format_duration(estimate(f.task_count()))
        );
    }
    let _ = writeln!(
        out,
        "{} features, {} tasks, about {}",
        features.len(),
        total_tasks,
        format_duration(estimate(total_tasks))
    );
    Ok(out)
}

/// `analysis` is `None` when there is not enough history to rank hours.
pub fn render_analysis(
    analysis: Option<&HourAnalysis>,
    records: usize,
    format: OutputFormat,
) -> Result<String, serde_json::Error> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(&json!({
            "records": records,
            "analysis": analysis,
        }));
    }

    let Some(analysis) = analysis else {
        return Ok(format!(
            "{records} records in history; not enough to rank hours\n"
        ));
    };

    let mut out = String::new();
    let hours: Vec<String> = analysis
        .optimal_hours
        .iter()
        .map(|h| format!("{h:02}"))
        .collect();
    let _ = writeln!(out, "{records} records; optimal hours: {}", hours.join(", "));
    let _ = writeln!(out, "{:<5} {:>6} {:>8} {:>9} {:>7}", "HOUR", "RUNS", "SUCCESS", "AVG TIME", "AVG CPU");
    for s in &analysis.statistics {
        let _ = writeln!(
            out,
            "{:02}:00 {:>6} {:>7.0}% {:>8.1}s {:>6.1}%",
            s.hour,
            s.total,
            s.success_rate * 100.0,
            s.avg_duration,
            s.avg_cpu
        );
    }
    Ok(out)
}

/// `1h 02m`, `3m 05s`, `42s`.
pub fn format_duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}
