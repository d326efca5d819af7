pub mod strategies;
pub mod work;

pub use strategies::{ExponentialBackoffPlugin, FixedDelayPlugin, LinearRetryPlugin, RetryConfig};
pub use work::{CommandWork, SimulatedWork};
