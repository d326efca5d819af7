mod feature;
mod summary;

pub use feature::Feature;
pub use summary::RunSummary;
