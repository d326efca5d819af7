use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::error::SchedulerError;

/// Allowed activity window on a 24-hour clock: `start_hour:00` inclusive,
/// `end_hour:00` exclusive.
///
/// `start == end` is an empty window that is never active. `start > end`
/// wraps midnight, e.g. `22..6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start_hour: u32,
    end_hour: u32,
}

impl TimeWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self, SchedulerError> {
        if start_hour >= 24 || end_hour >= 24 {
            return Err(SchedulerError::InvalidConfig(format!(
                "active hours must be within 0..24, got {start_hour}-{end_hour}"
            )));
        }
        Ok(Self {
            start_hour,
            end_hour,
        })
    }

    pub fn start_hour(&self) -> u32 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u32 {
        self.end_hour
    }

    pub fn is_empty(&self) -> bool {
        self.start_hour == self.end_hour
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        let start = hour_start(self.start_hour);
        let end = hour_start(self.end_hour);
        if self.start_hour < self.end_hour {
            start <= time && time < end
        } else if self.start_hour > self.end_hour {
            time >= start || time < end
        } else {
            false
        }
    }

    pub fn is_within_window(&self, now: NaiveDateTime) -> bool {
        self.contains(now.time())
    }

    /// Today at `start_hour:00` if that hour has not been reached yet,
    /// otherwise tomorrow. `None` for an empty window.
    pub fn next_window_start(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if self.is_empty() {
            return None;
        }
        let today = now.date().and_time(hour_start(self.start_hour));
        if now.hour() < self.start_hour {
            Some(today)
        } else {
            Some(today + Duration::days(1))
        }
    }
}

fn hour_start(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}
