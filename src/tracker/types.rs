// Tracker data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running statistics for one backend.
///
/// Every numeric field is an exact incremental mean over `sample_size`
/// interactions: recomputing from the full history reproduces the stored
/// value up to floating-point tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub user_satisfaction: f64,
    /// Successes per second of backend time
    pub efficiency_score: f64,
    pub sample_size: u64,
    pub last_updated: DateTime<Utc>,
}

impl PerformanceMetrics {
    pub fn empty() -> Self {
        Self {
            success_rate: 0.0,
            avg_response_time_ms: 0.0,
            user_satisfaction: 0.0,
            efficiency_score: 0.0,
            sample_size: 0,
            last_updated: Utc::now(),
        }
    }
}

/// Metrics with trend histories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackedMetric {
    SuccessRate,
    ResponseTime,
    Satisfaction,
}

impl TrackedMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackedMetric::SuccessRate => "success_rate",
            TrackedMetric::ResponseTime => "response_time",
            TrackedMetric::Satisfaction => "satisfaction",
        }
    }
}

/// Direction of a metric over its recent history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Medium,
    High,
}

/// A backend breaching one of the configured thresholds
#[derive(Debug, Clone)]
pub struct PerformanceIssue {
    pub backend: String,
    pub metric: TrackedMetric,
    pub current_value: f64,
    pub threshold: f64,
    pub severity: Severity,
}
