pub mod analyze;
pub mod inventory;
pub mod serve;

// Re-export command functions for convenience
pub use analyze::{analyze, AnalyzeArgs};
pub use inventory::inventory;
pub use serve::serve;
