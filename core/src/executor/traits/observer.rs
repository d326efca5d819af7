use async_trait::async_trait;

use crate::scheduler::ExecutionRecord;

/// Notified after every finished attempt.
#[async_trait]
pub trait AttemptObserver: Send + Sync {
    /// `duration` is in seconds.
    async fn record_attempt(&self, task_name: &str, duration: f64, success: bool);

    /// Called by the driver once every task of `feature` is terminal.
    fn feature_finished(&self, _feature: &str) {}
}

/// Durable destination for execution history.
pub trait HistorySink: Send + Sync {
    fn append(&self, record: &ExecutionRecord) -> anyhow::Result<()>;
}
