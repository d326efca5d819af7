pub mod executor;
pub mod factory;
pub mod history;
pub mod plan;
