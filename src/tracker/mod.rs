// Performance tracking
// Per-backend running statistics, trend analysis, and issue detection

mod logger;
mod types;

pub use logger::{InteractionLogger, InteractionRecord};
pub use types::{PerformanceIssue, PerformanceMetrics, Severity, TrackedMetric, Trend};

use chrono::Utc;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::RwLock;

use crate::config::TrackerConfig;

/// Alert thresholds. The success-rate bound is runtime-mutable (the
/// adaptation engine recomputes it); the others are fixed at load.
#[derive(Debug, Clone)]
pub struct TrackerThresholds {
    pub success_rate: f64,
    pub response_time_ms: f64,
    pub satisfaction: f64,
}

/// Tracks performance metrics for every backend the director dispatches to.
///
/// All methods take `&self`; per-backend state lives in `DashMap` entries so
/// concurrent request handlers only contend on the backend they touched.
/// Missing backends are excluded from aggregates, never reported as errors.
pub struct PerformanceTracker {
    metrics: DashMap<String, PerformanceMetrics>,
    /// Trend histories keyed `{backend}_{metric}`, oldest evicted first
    history: DashMap<String, VecDeque<f64>>,
    thresholds: RwLock<TrackerThresholds>,
    history_cap: usize,
    trend_window: usize,
}

impl PerformanceTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            metrics: DashMap::new(),
            history: DashMap::new(),
            thresholds: RwLock::new(TrackerThresholds {
                success_rate: config.success_rate_threshold,
                response_time_ms: config.response_time_threshold_ms,
                satisfaction: config.satisfaction_threshold,
            }),
            history_cap: config.history_cap,
            trend_window: config.trend_window,
        }
    }

    /// Record one interaction outcome for a backend.
    ///
    /// Each sub-metric is updated with the incremental mean
    /// `(old * n + new) / (n + 1)`; satisfaction only moves when a rating is
    /// supplied and efficiency only when the response time is positive, but
    /// `sample_size` advances by exactly one per call either way.
    pub fn record_interaction(
        &self,
        backend: &str,
        response_time_ms: f64,
        success: bool,
        user_rating: Option<f64>,
    ) {
        let mut entry = self
            .metrics
            .entry(backend.to_string())
            .or_insert_with(PerformanceMetrics::empty);

        let n = entry.sample_size as f64;
        let success_value = if success { 1.0 } else { 0.0 };

        entry.success_rate = (entry.success_rate * n + success_value) / (n + 1.0);
        entry.avg_response_time_ms = (entry.avg_response_time_ms * n + response_time_ms) / (n + 1.0);

        if let Some(rating) = user_rating {
            entry.user_satisfaction = (entry.user_satisfaction * n + rating) / (n + 1.0);
        }

        if response_time_ms > 0.0 {
            let efficiency = success_value / (response_time_ms / 1000.0);
            entry.efficiency_score = (entry.efficiency_score * n + efficiency) / (n + 1.0);
        }

        entry.sample_size += 1;
        entry.last_updated = Utc::now();

        let success_rate = entry.success_rate;
        drop(entry);

        self.push_history(backend, TrackedMetric::SuccessRate, success_rate);
        self.push_history(backend, TrackedMetric::ResponseTime, response_time_ms);
        if let Some(rating) = user_rating {
            self.push_history(backend, TrackedMetric::Satisfaction, rating);
        }

        tracing::debug!(
            "Recorded interaction for {}: success={}, time={}ms",
            backend,
            success,
            response_time_ms
        );
    }

    fn push_history(&self, backend: &str, metric: TrackedMetric, value: f64) {
        let key = format!("{}_{}", backend, metric.as_str());
        let mut series = self.history.entry(key).or_insert_with(VecDeque::new);
        if series.len() == self.history_cap {
            series.pop_front();
        }
        series.push_back(value);
    }

    pub fn get(&self, backend: &str) -> Option<PerformanceMetrics> {
        self.metrics.get(backend).map(|m| m.clone())
    }

    /// Drop a backend's statistics and trend histories.
    pub fn reset(&self, backend: &str) {
        self.metrics.remove(backend);
        for metric in [
            TrackedMetric::SuccessRate,
            TrackedMetric::ResponseTime,
            TrackedMetric::Satisfaction,
        ] {
            self.history
                .remove(&format!("{}_{}", backend, metric.as_str()));
        }
    }

    /// Trend of a metric from the slope of a linear fit over the most recent
    /// window. Needs at least 10 points for a verdict; slope within ±0.01 is
    /// `Stable`.
    pub fn trend(&self, backend: &str, metric: TrackedMetric) -> Trend {
        let key = format!("{}_{}", backend, metric.as_str());
        let series = match self.history.get(&key) {
            Some(series) => series,
            None => return Trend::InsufficientData,
        };

        if series.len() < 2 {
            return Trend::InsufficientData;
        }

        let start = series.len().saturating_sub(self.trend_window);
        let recent: Vec<f64> = series.iter().skip(start).copied().collect();
        if recent.len() < 10 {
            return Trend::InsufficientData;
        }

        let slope = linear_slope(&recent);
        if slope > 0.01 {
            Trend::Improving
        } else if slope < -0.01 {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }

    /// Every backend currently breaching a threshold, tagged with severity.
    pub fn issues(&self) -> Vec<PerformanceIssue> {
        let thresholds = self.thresholds.read().expect("thresholds lock poisoned");
        let mut issues = Vec::new();

        for entry in self.metrics.iter() {
            let backend = entry.key();
            let m = entry.value();

            if m.success_rate < thresholds.success_rate {
                issues.push(PerformanceIssue {
                    backend: backend.clone(),
                    metric: TrackedMetric::SuccessRate,
                    current_value: m.success_rate,
                    threshold: thresholds.success_rate,
                    severity: if m.success_rate < 0.7 {
                        Severity::High
                    } else {
                        Severity::Medium
                    },
                });
            }

            if m.avg_response_time_ms > thresholds.response_time_ms {
                issues.push(PerformanceIssue {
                    backend: backend.clone(),
                    metric: TrackedMetric::ResponseTime,
                    current_value: m.avg_response_time_ms,
                    threshold: thresholds.response_time_ms,
                    severity: if m.avg_response_time_ms > 15_000.0 {
                        Severity::High
                    } else {
                        Severity::Medium
                    },
                });
            }

            // Zero satisfaction means no ratings yet, not dissatisfaction
            if m.user_satisfaction > 0.0 && m.user_satisfaction < thresholds.satisfaction {
                issues.push(PerformanceIssue {
                    backend: backend.clone(),
                    metric: TrackedMetric::Satisfaction,
                    current_value: m.user_satisfaction,
                    threshold: thresholds.satisfaction,
                    severity: if m.user_satisfaction < 3.0 {
                        Severity::High
                    } else {
                        Severity::Medium
                    },
                });
            }
        }

        issues
    }

    /// Best backend for a metric among those with at least 5 samples.
    /// Response time is compared as its negation (lower is better).
    pub fn best_backend(&self, metric: TrackedMetric) -> Option<String> {
        let mut best: Option<(String, f64)> = None;

        for entry in self.metrics.iter() {
            let m = entry.value();
            if m.sample_size < 5 {
                continue;
            }

            let value = match metric {
                TrackedMetric::SuccessRate => m.success_rate,
                TrackedMetric::ResponseTime => -m.avg_response_time_ms,
                TrackedMetric::Satisfaction => m.user_satisfaction,
            };

            match &best {
                Some((_, best_value)) if value <= *best_value => {}
                _ => best = Some((entry.key().clone(), value)),
            }
        }

        best.map(|(backend, _)| backend)
    }

    pub fn success_rate_threshold(&self) -> f64 {
        self.thresholds
            .read()
            .expect("thresholds lock poisoned")
            .success_rate
    }

    pub fn set_success_rate_threshold(&self, value: f64) {
        self.thresholds
            .write()
            .expect("thresholds lock poisoned")
            .success_rate = value;
    }

    /// Mean success rate across backends with more than `min_samples`
    /// interactions, or `None` if no backend qualifies.
    pub fn avg_success_rate(&self, min_samples: u64) -> Option<f64> {
        let rates: Vec<f64> = self
            .metrics
            .iter()
            .filter(|e| e.value().sample_size > min_samples)
            .map(|e| e.value().success_rate)
            .collect();

        if rates.is_empty() {
            None
        } else {
            Some(rates.iter().sum::<f64>() / rates.len() as f64)
        }
    }

    /// Snapshot of all tracked backends (for health scoring).
    pub fn snapshot(&self) -> Vec<(String, PerformanceMetrics)> {
        self.metrics
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

/// Least-squares slope of evenly spaced points
fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64) * (i as f64)).sum();

    let denom = n * sum_x2 - sum_x * sum_x;
    if denom == 0.0 {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}
