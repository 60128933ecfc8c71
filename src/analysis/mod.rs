//! Saving, loading and upgrading analyses.

mod format;
mod store;
mod upgrade;

pub use format::{Analysis, StepData, ANALYSIS_VERSION};
pub use store::AnalysisStore;
pub use upgrade::upgrade_steps;
