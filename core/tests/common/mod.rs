#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autodev_core::api::{
    ActiveHours, AdmissionGate, FixedClock, FixedProbe, RetryStrategyPlugin, SchedulerConfig, SlotManager,
    Task, TaskResult, TaskWork,
};
use chrono::{NaiveDate, NaiveDateTime};

pub fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

pub struct TestStrategy {
    pub attempts: u32,
    pub delay: Duration,
}

impl TestStrategy {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts,
            delay: Duration::from_secs(60),
        }
    }
}

impl RetryStrategyPlugin for TestStrategy {
    fn name(&self) -> &str {
        "test"
    }

    fn next_delay(&self, _attempt: u32, _error: &str) -> Option<Duration> {
        Some(self.delay)
    }

    fn max_attempts(&self) -> u32 {
        self.attempts
    }
}

/// Work that takes `duration`, fails tasks named in `failing`, never
/// returns when `hang` is set, and records start order and peak concurrency.
pub struct ScriptedWork {
    pub duration: Duration,
    pub failing: Vec<String>,
    pub hang: bool,
    pub started: Mutex<Vec<String>>,
    pub running: AtomicUsize,
    pub peak: AtomicUsize,
}

impl ScriptedWork {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            failing: Vec::new(),
            hang: false,
            started: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, names: &[&str]) -> Self {
        self.failing = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn attempts_of(&self, name: &str) -> usize {
        self.started().iter().filter(|n| n.as_str() == name).count()
    }
}

/// Decrements the running counter even when the attempt is dropped.
struct Running<'a>(&'a AtomicUsize);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskWork for ScriptedWork {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, task: &Task) -> anyhow::Result<TaskResult> {
        self.started.lock().unwrap().push(task.name.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _running = Running(&self.running);

        if self.hang {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.duration).await;

        let secs = self.duration.as_secs_f64();
        if self.failing.contains(&task.name) {
            Ok(TaskResult::failure(format!("{} failed its tests", task.name), secs))
        } else {
            Ok(TaskResult::success("done", secs, Vec::new()))
        }
    }
}

pub struct Harness {
    pub config: SchedulerConfig,
    pub slots: Arc<SlotManager>,
    pub probe: Arc<FixedProbe>,
    pub clock: Arc<FixedClock>,
    pub gate: Arc<AdmissionGate>,
}

/// Window 9-18, clock at 10:00, idle host.
pub fn harness(max_slots: usize) -> Harness {
    harness_with_hours(max_slots, 9, 18)
}

/// Clock at 10:00, idle host.
pub fn harness_with_hours(max_slots: usize, start: u32, end: u32) -> Harness {
    // Shows scheduler logs for failing tests only (`cargo test -- --nocapture` for all).
    let _ = tracing_subscriber::fmt()
        .with_env_filter("autodev_core=debug")
        .with_test_writer()
        .try_init();

    let config = SchedulerConfig {
        max_concurrent_tasks: max_slots,
        active_hours: ActiveHours { start, end },
        ..SchedulerConfig::default()
    };
    let slots = Arc::new(SlotManager::new(max_slots));
    let probe = Arc::new(FixedProbe::idle());
    let clock = Arc::new(FixedClock::new(at(10, 0)));
    let gate = Arc::new(
        AdmissionGate::new(&config, slots.clone(), probe.clone(), clock.clone()).unwrap(),
    );
    Harness {
        config,
        slots,
        probe,
        clock,
        gate,
    }
}
