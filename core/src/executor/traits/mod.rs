pub mod observer;
pub mod strategy;
pub mod work;

pub use observer::*;
pub use strategy::*;
pub use work::*;
