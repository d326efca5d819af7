mod command;
mod simulated;

pub use command::CommandWork;
pub use simulated::SimulatedWork;
