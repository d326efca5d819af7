use serde::Serialize;

use crate::queue::{FeatureProgress, QueueStatistics};

/// Outcome of one driver run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// In processing order.
    pub features: Vec<FeatureProgress>,
    pub statistics: QueueStatistics,
    pub cancelled: bool,
    /// Wall time of the whole run, in seconds.
    pub elapsed: f64,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        !self.cancelled
            && self.statistics.failed == 0
            && self.statistics.pending == 0
            && self.statistics.running == 0
    }
}
