pub mod engine;
pub mod kernel;

pub use engine::{AnalysisEngine, RunOutcome};
