use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::Timelike;
use tracing::{debug, info, warn};

use super::admission::{AdmissionDecision, AdmissionPolicy, DenyReason};
use super::history::{analyze_hours, ExecutionHistory, ExecutionRecord, HourAnalysis};
use crate::clock::Clock;
use crate::config::AdaptiveConfig;
use crate::executor::traits::{AttemptObserver, HistorySink};
use crate::monitor::ResourceProbe;

/// Narrows another admission policy to historically favorable hours.
///
/// Until enough history exists (or `analyze` has not run yet) every decision
/// is delegated unchanged. Afterwards an hour outside the learned set is
/// denied before the inner policy is consulted; the inner policy can still
/// deny inside it. Admission is never widened.
pub struct AdaptiveGate<G> {
    inner: Arc<G>,
    probe: Arc<dyn ResourceProbe>,
    clock: Arc<dyn Clock>,
    history: Mutex<ExecutionHistory>,
    optimal_hours: RwLock<Option<Vec<u32>>>,
    sink: Option<Arc<dyn HistorySink>>,
    min_records: usize,
    top_hours: usize,
}

impl<G: AdmissionPolicy> AdaptiveGate<G> {
    pub fn new(
        inner: Arc<G>,
        config: &AdaptiveConfig,
        probe: Arc<dyn ResourceProbe>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner,
            probe,
            clock,
            history: Mutex::new(ExecutionHistory::new(config.history_capacity)),
            optimal_hours: RwLock::new(None),
            sink: None,
            min_records: config.min_records,
            top_hours: config.top_hours,
        }
    }

    /// Persist every new record through `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn inner(&self) -> &Arc<G> {
        &self.inner
    }

    /// Seed the in-memory history, e.g. from a previous run.
    pub fn load_history<I: IntoIterator<Item = ExecutionRecord>>(&self, records: I) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.extend(records);
        debug!(records = history.len(), "execution history loaded");
    }

    pub fn history(&self) -> Vec<ExecutionRecord> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .to_vec()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn optimal_hours(&self) -> Option<Vec<u32>> {
        self.optimal_hours
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Append a record stamped with the current time and a fresh resource
    /// sample.
    pub async fn record(&self, task_name: &str, duration: f64, success: bool) -> ExecutionRecord {
        let (cpu, memory) = match self.probe.sample().await {
            Ok(reading) => (Some(reading.cpu_percent), Some(reading.memory_percent)),
            Err(err) => {
                warn!(task_name, error = %err, "recording attempt without resource sample");
                (None, None)
            }
        };

        let record = ExecutionRecord {
            task_name: task_name.to_string(),
            timestamp: self.clock.now(),
            duration,
            success,
            cpu_at_time: cpu,
            memory_at_time: memory,
        };

        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());

        if let Some(sink) = self.sink.clone() {
            let persisted = record.clone();
            match tokio::task::spawn_blocking(move || sink.append(&persisted)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(task_name, error = %err, "failed to persist execution record")
                }
                Err(err) => warn!(task_name, error = %err, "history writer did not finish"),
            }
        }
        record
    }

    /// Recompute the optimal hours. `None` while fewer than `min_records`
    /// records exist, in which case the previous ranking is kept.
    pub fn analyze(&self) -> Option<HourAnalysis> {
        let analysis = {
            let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() < self.min_records {
                return None;
            }
            analyze_hours(history.iter(), self.top_hours)
        };

        info!(optimal_hours = ?analysis.optimal_hours, "optimal hours updated");
        *self
            .optimal_hours
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(analysis.optimal_hours.clone());
        Some(analysis)
    }

    pub async fn should_execute_now(&self) -> AdmissionDecision {
        if let Some(hours) = self.optimal_hours() {
            let hour = self.clock.now().hour();
            if !hours.contains(&hour) {
                return AdmissionDecision::deny(DenyReason::NotOptimalHour { hour });
            }
        }
        self.inner.can_admit().await
    }
}

#[async_trait]
impl<G: AdmissionPolicy> AdmissionPolicy for AdaptiveGate<G> {
    async fn can_admit(&self) -> AdmissionDecision {
        self.should_execute_now().await
    }
}

#[async_trait]
impl<G: AdmissionPolicy> AttemptObserver for AdaptiveGate<G> {
    async fn record_attempt(&self, task_name: &str, duration: f64, success: bool) {
        self.record(task_name, duration, success).await;
    }

    fn feature_finished(&self, _feature: &str) {
        self.analyze();
    }
}
