pub mod retry;

pub use retry::{ExponentialBackoffPlugin, FixedDelayPlugin, LinearRetryPlugin, RetryConfig};
