// Adaptation data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of knob an adaptation turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationKind {
    RoutingOptimization,
    PromptEnhancement,
    PerformanceTuning,
    ThresholdAdjustment,
    ModelSelection,
}

impl AdaptationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdaptationKind::RoutingOptimization => "routing_optimization",
            AdaptationKind::PromptEnhancement => "prompt_enhancement",
            AdaptationKind::PerformanceTuning => "performance_tuning",
            AdaptationKind::ThresholdAdjustment => "threshold_adjustment",
            AdaptationKind::ModelSelection => "model_selection",
        }
    }
}

/// One proposed tuning action. Transient; only the application outcome
/// survives, in the adaptation history log.
#[derive(Debug, Clone)]
pub struct AdaptationRecommendation {
    pub kind: AdaptationKind,
    pub target: String,
    pub description: String,
    pub expected_improvement: f64,
    pub confidence: f64,
    /// Lower is more urgent
    pub priority: u8,
    pub rollback_plan: String,
}

/// Entry in the bounded adaptation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: AdaptationKind,
    pub target: String,
    pub description: String,
    pub success: bool,
    pub expected_improvement: f64,
    pub confidence: f64,
}

/// Result of one adaptation cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub skipped: bool,
    pub analyzed: usize,
    pub implemented: usize,
    pub failed: usize,
}

impl CycleOutcome {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            analyzed: 0,
            implemented: 0,
            failed: 0,
        }
    }
}
