use std::time::Duration;

/// Decides how long to wait between failed attempts and when to give up.
///
/// `attempt` is the 1-based number of the attempt that just failed.
pub trait RetryStrategyPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Delay before the next attempt; `None` stops retrying.
    fn next_delay(&self, attempt: u32, error: &str) -> Option<Duration>;

    /// Total attempts allowed, including the first one.
    fn max_attempts(&self) -> u32;

    fn should_retry(&self, attempt: u32, error: &str) -> bool {
        attempt < self.max_attempts() && !self.is_fatal_error(error)
    }

    fn is_fatal_error(&self, _error: &str) -> bool {
        false
    }
}
