use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sysinfo::{Disks, System};

use crate::error::SchedulerError;

/// One CPU + memory reading, both in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceReading {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

impl ResourceReading {
    /// Both readings strictly below their thresholds.
    pub fn is_idle(&self, cpu_threshold: f32, memory_threshold: f32) -> bool {
        self.cpu_percent < cpu_threshold && self.memory_percent < memory_threshold
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemSnapshot {
    pub platform: String,
    pub cpu_count: usize,
    pub cpu_percent: f32,
    /// Bytes.
    pub memory_total: u64,
    /// Bytes.
    pub memory_available: u64,
    pub memory_percent: f32,
}

impl SystemSnapshot {
    pub fn memory_total_gb(&self) -> f64 {
        self.memory_total as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    pub fn memory_available_gb(&self) -> f64 {
        self.memory_available as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

/// Samples host utilization on demand.
///
/// CPU sampling observes a short real-time window, so every method is a
/// suspension point. Callers racing a cancellation token may drop the future
/// at any time.
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    async fn cpu_usage(&self) -> Result<f32, SchedulerError>;

    async fn memory_usage(&self) -> Result<f32, SchedulerError>;

    async fn disk_usage(&self, path: &Path) -> Result<f32, SchedulerError>;

    async fn system_snapshot(&self) -> Result<SystemSnapshot, SchedulerError>;

    async fn sample(&self) -> Result<ResourceReading, SchedulerError> {
        Ok(ResourceReading {
            cpu_percent: self.cpu_usage().await?,
            memory_percent: self.memory_usage().await?,
        })
    }

    async fn is_idle(
        &self,
        cpu_threshold: f32,
        memory_threshold: f32,
    ) -> Result<bool, SchedulerError> {
        Ok(self.sample().await?.is_idle(cpu_threshold, memory_threshold))
    }
}

/// [`ResourceProbe`] backed by `sysinfo`.
pub struct SysinfoMonitor {
    sys: Mutex<System>,
    cpu_window: Duration,
    snapshot_window: Duration,
}

impl SysinfoMonitor {
    pub fn new() -> Self {
        Self::with_windows(Duration::from_secs(1), Duration::from_millis(500))
    }

    /// `cpu_window` is the observation window for `cpu_usage`,
    /// `snapshot_window` the one used by `system_snapshot`.
    pub fn with_windows(cpu_window: Duration, snapshot_window: Duration) -> Self {
        Self {
            sys: Mutex::new(System::new()),
            cpu_window: cpu_window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
            snapshot_window: snapshot_window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, System>, SchedulerError> {
        self.sys
            .lock()
            .map_err(|_| SchedulerError::SamplingFailure("system handle poisoned".into()))
    }

    async fn sample_cpu(&self, window: Duration) -> Result<f32, SchedulerError> {
        self.lock()?.refresh_cpu();
        tokio::time::sleep(window).await;
        let mut sys = self.lock()?;
        sys.refresh_cpu();
        let usage = sys.global_cpu_info().cpu_usage();
        if usage.is_finite() {
            Ok(usage)
        } else {
            Err(SchedulerError::SamplingFailure(format!(
                "cpu reading is not a number: {usage}"
            )))
        }
    }

    fn memory(&self) -> Result<(u64, u64), SchedulerError> {
        let mut sys = self.lock()?;
        sys.refresh_memory();
        let total = sys.total_memory();
        if total == 0 {
            return Err(SchedulerError::SamplingFailure(
                "total memory reported as zero".into(),
            ));
        }
        Ok((total, sys.available_memory()))
    }
}

impl Default for SysinfoMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn used_percent(total: u64, available: u64) -> f32 {
    let used = total.saturating_sub(available);
    (used as f64 / total as f64 * 100.0) as f32
}

#[async_trait]
impl ResourceProbe for SysinfoMonitor {
    async fn cpu_usage(&self) -> Result<f32, SchedulerError> {
        self.sample_cpu(self.cpu_window).await
    }

    async fn memory_usage(&self) -> Result<f32, SchedulerError> {
        let (total, available) = self.memory()?;
        Ok(used_percent(total, available))
    }

    async fn disk_usage(&self, path: &Path) -> Result<f32, SchedulerError> {
        let disks = Disks::new_with_refreshed_list();
        // The mount point with the longest matching prefix owns the path.
        let disk = disks
            .list()
            .iter()
            .filter(|d| path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .ok_or_else(|| {
                SchedulerError::SamplingFailure(format!("no disk mounted at {}", path.display()))
            })?;

        let total = disk.total_space();
        if total == 0 {
            return Err(SchedulerError::SamplingFailure(format!(
                "disk at {} reports zero capacity",
                disk.mount_point().display()
            )));
        }
        Ok(used_percent(total, disk.available_space()))
    }

    async fn system_snapshot(&self) -> Result<SystemSnapshot, SchedulerError> {
        let cpu_percent = self.sample_cpu(self.snapshot_window).await?;
        let (memory_total, memory_available) = self.memory()?;
        Ok(SystemSnapshot {
            platform: std::env::consts::OS.to_string(),
            cpu_count: num_cpus::get(),
            cpu_percent,
            memory_total,
            memory_available,
            memory_percent: used_percent(memory_total, memory_available),
        })
    }
}
