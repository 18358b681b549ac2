// Self-adaptation: periodic analysis and bounded tuning of the router

mod engine;
mod runner;
mod types;

pub use engine::SystemAdaptationEngine;
pub use runner::Runner;
pub use types::{AdaptationKind, AdaptationRecommendation, AdaptationRecord, CycleOutcome};
