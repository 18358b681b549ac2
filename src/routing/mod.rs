// Adaptive routing
// Public interface for routing decisions and outcome learning

mod engine;
mod features;

pub use engine::{AdaptiveRoutingEngine, DecisionSource, RoutingDecision};
pub use features::TaskFeatures;
