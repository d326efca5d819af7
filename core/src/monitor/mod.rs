//! Host resource sampling.

mod fixed;
mod resource;

pub use fixed::FixedProbe;
pub use resource::{ResourceProbe, ResourceReading, SysinfoMonitor, SystemSnapshot};
