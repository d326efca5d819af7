use std::collections::{BTreeMap, VecDeque};

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// One finished attempt, with the host load observed when it was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub task_name: String,
    pub timestamp: NaiveDateTime,
    /// Seconds.
    pub duration: f64,
    pub success: bool,
    /// `None` when the host could not be sampled.
    pub cpu_at_time: Option<f32>,
    pub memory_at_time: Option<f32>,
}

impl ExecutionRecord {
    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }
}

/// Append-only log capped at `capacity`; the oldest records fall off first.
#[derive(Debug, Clone)]
pub struct ExecutionHistory {
    records: VecDeque<ExecutionRecord>,
    capacity: usize,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, record: ExecutionRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn extend<I: IntoIterator<Item = ExecutionRecord>>(&mut self, records: I) {
        for record in records {
            self.push(record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.iter()
    }

    pub fn to_vec(&self) -> Vec<ExecutionRecord> {
        self.records.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourStats {
    pub hour: u32,
    pub total: usize,
    pub successes: usize,
    pub success_rate: f64,
    /// Seconds.
    pub avg_duration: f64,
    /// Percent; 100 when no reading was available for the hour.
    pub avg_cpu: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourAnalysis {
    /// Best first.
    pub optimal_hours: Vec<u32>,
    /// One entry per hour present in the history, by hour.
    pub statistics: Vec<HourStats>,
}

#[derive(Default)]
struct HourAccumulator {
    total: usize,
    successes: usize,
    duration_sum: f64,
    cpu_sum: f64,
    cpu_samples: usize,
}

/// Rank hours by success rate (descending), then average CPU (ascending),
/// and keep the best `top`.
pub fn analyze_hours<'a, I>(records: I, top: usize) -> HourAnalysis
where
    I: IntoIterator<Item = &'a ExecutionRecord>,
{
    let mut by_hour: BTreeMap<u32, HourAccumulator> = BTreeMap::new();
    for record in records {
        let acc = by_hour.entry(record.hour()).or_default();
        acc.total += 1;
        if record.success {
            acc.successes += 1;
        }
        acc.duration_sum += record.duration;
        if let Some(cpu) = record.cpu_at_time {
            acc.cpu_sum += cpu as f64;
            acc.cpu_samples += 1;
        }
    }

    let statistics: Vec<HourStats> = by_hour
        .into_iter()
        .map(|(hour, acc)| HourStats {
            hour,
            total: acc.total,
            successes: acc.successes,
            success_rate: acc.successes as f64 / acc.total as f64,
            avg_duration: acc.duration_sum / acc.total as f64,
            avg_cpu: if acc.cpu_samples > 0 {
                acc.cpu_sum / acc.cpu_samples as f64
            } else {
                100.0
            },
        })
        .collect();

    let mut ranked: Vec<&HourStats> = statistics.iter().collect();
    // Stable sort: equal hours keep clock order.
    ranked.sort_by(|a, b| {
        b.success_rate
            .total_cmp(&a.success_rate)
            .then(a.avg_cpu.total_cmp(&b.avg_cpu))
    });
    let optimal_hours = ranked.iter().take(top).map(|s| s.hour).collect();

    HourAnalysis {
        optimal_hours,
        statistics,
    }
}
