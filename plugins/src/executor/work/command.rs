use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use autodev_core::api::{Task, TaskResult, TaskWork, WorkConfig};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::debug;

const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Runs a task's shell command through `sh -c`.
///
/// The task's own `command` wins over the configured template. Exit status 0
/// is success; the child is killed if the attempt is dropped.
pub struct CommandWork {
    template: Option<String>,
    workdir: Option<PathBuf>,
    output_limit: usize,
}

impl CommandWork {
    pub fn new() -> Self {
        Self::from_config(&WorkConfig::default())
    }

    pub fn from_config(cfg: &WorkConfig) -> Self {
        Self {
            template: cfg.command_template.clone(),
            workdir: cfg.workdir.as_ref().map(PathBuf::from),
            output_limit: cfg.output_limit,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = bytes;
        self
    }

    /// The command line for `task`, placeholders filled in.
    pub fn command_for(&self, task: &Task) -> Option<String> {
        let raw = task.command.as_ref().or(self.template.as_ref())?;
        let files = task
            .files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        Some(
            raw.replace("{feature}", &task.feature_name)
                .replace("{task}", &task.name)
                .replace("{files}", &files),
        )
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.workdir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl Default for CommandWork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskWork for CommandWork {
    fn name(&self) -> &str {
        "command"
    }

    async fn execute(&self, task: &Task) -> Result<TaskResult> {
        let Some(cmdline) = self.command_for(task) else {
            bail!(
                "task '{}' has no command and no work.command_template is configured",
                task.id()
            );
        };
        debug!(task_name = %task.id(), command = %cmdline, "running task command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&cmdline)
            .env("AUTODEV_FEATURE", &task.feature_name)
            .env("AUTODEV_TASK", &task.name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{cmdline}`"))?;
        let stdout = child.stdout.take().context("child stdout was not piped")?;
        let stderr = child.stderr.take().context("child stderr was not piped")?;
        let (stdout, stderr, status) = tokio::try_join!(
            read_bounded(stdout, self.output_limit),
            read_bounded(stderr, self.output_limit),
            child.wait(),
        )
        .with_context(|| format!("failed to collect output of `{cmdline}`"))?;
        let duration = started.elapsed().as_secs_f64();

        let stdout = render_output(stdout);
        if status.success() {
            let generated = task
                .files
                .iter()
                .filter(|p| self.resolve(p).exists())
                .cloned()
                .collect();
            return Ok(TaskResult::success(stdout, duration, generated));
        }

        let stderr = render_output(stderr);
        let code = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let mut result = TaskResult::failure(
            format!("exit status {code}: {}", stderr.trim()),
            duration,
        );
        result.output = stdout;
        Ok(result)
    }
}

/// Leading bytes of a stream, and whether anything was dropped.
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Keeps the first `limit` bytes and drains the rest, so the child never
/// blocks on a full pipe and memory stays bounded.
async fn read_bounded<R>(mut reader: R, limit: usize) -> std::io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::with_capacity(limit.min(8 * 1024));
    let mut chunk = [0u8; 8 * 1024];
    let mut truncated = false;
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(bytes.len());
        if n > room {
            truncated = true;
        }
        bytes.extend_from_slice(&chunk[..n.min(room)]);
    }
    Ok(Captured { bytes, truncated })
}

fn render_output(captured: Captured) -> String {
    let Captured {
        mut bytes,
        truncated,
    } = captured;
    if truncated {
        // Drop a multi-byte character split by the cut.
        if let Err(err) = std::str::from_utf8(&bytes) {
            if err.error_len().is_none() {
                bytes.truncate(err.valid_up_to());
            }
        }
    }
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if truncated {
        text.push_str(TRUNCATION_MARKER);
    }
    text
}
