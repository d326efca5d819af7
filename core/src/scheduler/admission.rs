use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::slots::SlotManager;
use super::status::SchedulerStatus;
use super::window::TimeWindow;
use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::monitor::ResourceProbe;

/// Why admission was denied.
#[derive(Debug, Clone, PartialEq)]
pub enum DenyReason {
    Paused,
    SlotsExhausted { max: usize },
    OutsideWindow { now: NaiveTime, start: u32, end: u32 },
    /// `start == end`: the window never opens.
    EmptyWindow { hour: u32 },
    Busy { cpu: f32, memory: f32 },
    /// Resource state could not be read; treated as not idle.
    ResourcesUnknown(String),
    NotOptimalHour { hour: u32 },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paused => f.write_str("manually paused"),
            Self::SlotsExhausted { max } => write!(f, "max concurrent tasks reached ({max})"),
            Self::OutsideWindow { now, start, end } => write!(
                f,
                "outside active hours ({}); allowed window: {start}:00 - {end}:00",
                now.format("%H:%M")
            ),
            Self::EmptyWindow { hour } => write!(
                f,
                "active window {hour}:00 - {hour}:00 is empty; nothing is ever admitted"
            ),
            Self::Busy { cpu, memory } => {
                write!(f, "system busy (CPU: {cpu:.1}%, memory: {memory:.1}%)")
            }
            Self::ResourcesUnknown(err) => write!(f, "resource state unknown: {err}"),
            Self::NotOptimalHour { hour } => {
                write!(f, "current hour ({hour}) is not among the optimal hours")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionDecision {
    denial: Option<DenyReason>,
}

impl AdmissionDecision {
    pub fn ready() -> Self {
        Self { denial: None }
    }

    pub fn deny(reason: DenyReason) -> Self {
        Self {
            denial: Some(reason),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.denial.is_none()
    }

    pub fn denial(&self) -> Option<&DenyReason> {
        self.denial.as_ref()
    }

    /// Human-readable reason; "ready" when allowed.
    pub fn reason(&self) -> String {
        match &self.denial {
            Some(reason) => reason.to_string(),
            None => "ready".to_string(),
        }
    }
}

/// Anything that can answer "may a task start right now?".
#[async_trait]
pub trait AdmissionPolicy: Send + Sync {
    async fn can_admit(&self) -> AdmissionDecision;
}

/// Base admission gate. Checks, first failure wins:
/// pause flag, slot availability, active window, resource headroom.
pub struct AdmissionGate {
    paused: AtomicBool,
    slots: Arc<SlotManager>,
    window: TimeWindow,
    probe: Arc<dyn ResourceProbe>,
    clock: Arc<dyn Clock>,
    cpu_threshold: f32,
    memory_threshold: f32,
}

impl AdmissionGate {
    pub fn new(
        config: &SchedulerConfig,
        slots: Arc<SlotManager>,
        probe: Arc<dyn ResourceProbe>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        let window = TimeWindow::new(config.active_hours.start, config.active_hours.end)?;
        Ok(Self {
            paused: AtomicBool::new(false),
            slots,
            window,
            probe,
            clock,
            cpu_threshold: config.cpu_threshold,
            memory_threshold: config.memory_threshold,
        })
    }

    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            info!("scheduler paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            info!("scheduler resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn slots(&self) -> &Arc<SlotManager> {
        &self.slots
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn probe(&self) -> &Arc<dyn ResourceProbe> {
        &self.probe
    }

    pub fn is_within_window(&self) -> bool {
        self.window.is_within_window(self.clock.now())
    }

    /// Window and resource checks only, ignoring pause and slots.
    pub async fn check_environment(&self) -> AdmissionDecision {
        if self.window.is_empty() {
            return AdmissionDecision::deny(DenyReason::EmptyWindow {
                hour: self.window.start_hour(),
            });
        }
        let now = self.clock.now();
        if !self.window.is_within_window(now) {
            return AdmissionDecision::deny(DenyReason::OutsideWindow {
                now: now.time(),
                start: self.window.start_hour(),
                end: self.window.end_hour(),
            });
        }

        match self.probe.sample().await {
            Ok(reading) if reading.is_idle(self.cpu_threshold, self.memory_threshold) => {
                AdmissionDecision::ready()
            }
            Ok(reading) => AdmissionDecision::deny(DenyReason::Busy {
                cpu: reading.cpu_percent,
                memory: reading.memory_percent,
            }),
            Err(err) => AdmissionDecision::deny(DenyReason::ResourcesUnknown(err.to_string())),
        }
    }

    /// Wait until the window is open and the host is idle, re-checking every
    /// `interval`. Fails at once with [`SchedulerError::EmptyWindow`] when the
    /// window can never open.
    pub async fn wait_for_ready(
        &self,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), SchedulerError> {
        if self.window.is_empty() {
            return Err(SchedulerError::EmptyWindow {
                hour: self.window.start_hour(),
            });
        }
        loop {
            let decision = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SchedulerError::Cancelled),
                d = self.check_environment() => d,
            };
            if decision.is_allowed() {
                return Ok(());
            }

            let now = self.clock.now();
            if self.window.is_within_window(now) {
                info!(reason = %decision.reason(), "waiting for resources");
            } else {
                let next_window = self
                    .window
                    .next_window_start(now)
                    .map(|next| next.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                info!(reason = %decision.reason(), next_window, "waiting for active window");
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SchedulerError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    pub async fn status(&self) -> SchedulerStatus {
        let decision = self.can_admit().await;
        let system = match self.probe.system_snapshot().await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                debug!(error = %err, "system snapshot unavailable");
                None
            }
        };

        SchedulerStatus {
            can_admit: decision.is_allowed(),
            reason: decision.reason(),
            paused: self.is_paused(),
            running_tasks: self.slots.running_count(),
            max_concurrent: self.slots.max_slots(),
            available_slots: self.slots.available_slots(),
            within_window: self.is_within_window(),
            active_hours: (self.window.start_hour(), self.window.end_hour()),
            next_window_start: self.window.next_window_start(self.clock.now()),
            system,
        }
    }
}

#[async_trait]
impl AdmissionPolicy for AdmissionGate {
    async fn can_admit(&self) -> AdmissionDecision {
        if self.is_paused() {
            return AdmissionDecision::deny(DenyReason::Paused);
        }
        if self.slots.is_full() {
            return AdmissionDecision::deny(DenyReason::SlotsExhausted {
                max: self.slots.max_slots(),
            });
        }
        self.check_environment().await
    }
}
