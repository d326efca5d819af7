use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::resource::{ResourceProbe, ResourceReading, SystemSnapshot};
use crate::error::SchedulerError;

/// A probe that returns preset readings without touching the host.
///
/// Used for deterministic scheduling (tests, simulated runs).
#[derive(Debug)]
pub struct FixedProbe {
    reading: Mutex<ResourceReading>,
    failing: AtomicBool,
    samples: AtomicUsize,
}

impl FixedProbe {
    pub fn new(cpu_percent: f32, memory_percent: f32) -> Self {
        Self {
            reading: Mutex::new(ResourceReading {
                cpu_percent,
                memory_percent,
            }),
            failing: AtomicBool::new(false),
            samples: AtomicUsize::new(0),
        }
    }

    /// An idle host: 5% CPU, 20% memory.
    pub fn idle() -> Self {
        Self::new(5.0, 20.0)
    }

    pub fn set(&self, cpu_percent: f32, memory_percent: f32) {
        *self.reading.lock().unwrap_or_else(|e| e.into_inner()) = ResourceReading {
            cpu_percent,
            memory_percent,
        };
    }

    /// Make every subsequent sample fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of CPU or memory samples taken so far.
    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<ResourceReading, SchedulerError> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SchedulerError::SamplingFailure("probe unavailable".into()));
        }
        Ok(*self.reading.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Default for FixedProbe {
    fn default() -> Self {
        Self::idle()
    }
}

#[async_trait]
impl ResourceProbe for FixedProbe {
    async fn cpu_usage(&self) -> Result<f32, SchedulerError> {
        Ok(self.read()?.cpu_percent)
    }

    async fn memory_usage(&self) -> Result<f32, SchedulerError> {
        Ok(self.read()?.memory_percent)
    }

    async fn disk_usage(&self, _path: &Path) -> Result<f32, SchedulerError> {
        Ok(self.read()?.memory_percent)
    }

    async fn system_snapshot(&self) -> Result<SystemSnapshot, SchedulerError> {
        let reading = self.read()?;
        let total: u64 = 16 * 1024 * 1024 * 1024;
        let available = (total as f64 * (1.0 - reading.memory_percent as f64 / 100.0)) as u64;
        Ok(SystemSnapshot {
            platform: "fixed".to_string(),
            cpu_count: 1,
            cpu_percent: reading.cpu_percent,
            memory_total: total,
            memory_available: available,
            memory_percent: reading.memory_percent,
        })
    }
}
