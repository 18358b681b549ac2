// System adaptation engine
// Periodic analyze/apply loop over tracker and router state

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::backends::BackendRegistry;
use crate::config::AdaptationConfig;
use crate::routing::AdaptiveRoutingEngine;
use crate::tracker::{PerformanceTracker, TrackedMetric};

use super::types::{AdaptationKind, AdaptationRecommendation, AdaptationRecord, CycleOutcome};

/// Analyzes router and tracker state on a cooldown-guarded interval and
/// applies a bounded batch of safe tuning actions. Application failures are
/// logged into the history and never reach the caller.
pub struct SystemAdaptationEngine {
    config: AdaptationConfig,
    tracker: Arc<PerformanceTracker>,
    routing: Arc<AdaptiveRoutingEngine>,
    registry: Arc<BackendRegistry>,
    last_adaptation: Mutex<Option<Instant>>,
    history: Mutex<VecDeque<AdaptationRecord>>,
}

impl SystemAdaptationEngine {
    pub fn new(
        config: AdaptationConfig,
        tracker: Arc<PerformanceTracker>,
        routing: Arc<AdaptiveRoutingEngine>,
        registry: Arc<BackendRegistry>,
    ) -> Self {
        Self {
            config,
            tracker,
            routing,
            registry,
            last_adaptation: Mutex::new(None),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Inspect current state and emit prioritized recommendations,
    /// sorted by (priority ascending, confidence descending).
    pub fn analyze(&self) -> Vec<AdaptationRecommendation> {
        let mut recommendations = Vec::new();

        let accuracy = self.routing.accuracy();
        if accuracy < self.config.accuracy_threshold {
            recommendations.push(AdaptationRecommendation {
                kind: AdaptationKind::RoutingOptimization,
                target: "routing_engine".to_string(),
                description: format!("Routing accuracy {:.3} below target", accuracy),
                expected_improvement: self.config.accuracy_threshold - accuracy,
                confidence: 0.8,
                priority: 1,
                rollback_plan: "Restore previous confidence threshold".to_string(),
            });
        }

        for issue in self.tracker.issues() {
            match issue.metric {
                TrackedMetric::ResponseTime => recommendations.push(AdaptationRecommendation {
                    kind: AdaptationKind::PerformanceTuning,
                    target: issue.backend.clone(),
                    description: format!(
                        "Response time {:.0}ms exceeds {:.0}ms",
                        issue.current_value, issue.threshold
                    ),
                    expected_improvement: 0.1,
                    confidence: 0.7,
                    priority: 2,
                    rollback_plan: "Restore previous timeout".to_string(),
                }),
                TrackedMetric::SuccessRate => recommendations.push(AdaptationRecommendation {
                    kind: AdaptationKind::PromptEnhancement,
                    target: issue.backend.clone(),
                    description: format!(
                        "Success rate {:.3} below {:.3}",
                        issue.current_value, issue.threshold
                    ),
                    expected_improvement: issue.threshold - issue.current_value,
                    confidence: 0.6,
                    priority: 1,
                    rollback_plan: "Revert prompt changes".to_string(),
                }),
                TrackedMetric::Satisfaction => recommendations.push(AdaptationRecommendation {
                    kind: AdaptationKind::ModelSelection,
                    target: issue.backend.clone(),
                    description: format!(
                        "User satisfaction {:.1} below {:.1}",
                        issue.current_value, issue.threshold
                    ),
                    expected_improvement: 0.1,
                    confidence: 0.5,
                    priority: 2,
                    rollback_plan: "Keep current model assignment".to_string(),
                }),
            }
        }

        // Healthy system: propose a gentle alert-threshold recalibration
        if recommendations.is_empty() {
            recommendations.push(AdaptationRecommendation {
                kind: AdaptationKind::ThresholdAdjustment,
                target: "performance_tracker".to_string(),
                description: "System healthy; recalibrate alert thresholds".to_string(),
                expected_improvement: 0.02,
                confidence: 0.5,
                priority: 5,
                rollback_plan: "Restore previous alert threshold".to_string(),
            });
        }

        recommendations.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.confidence.total_cmp(&a.confidence))
        });
        recommendations
    }

    /// Apply one recommendation. Returns whether it took effect; the outcome
    /// is always appended to the history.
    pub fn apply(&self, recommendation: &AdaptationRecommendation) -> bool {
        let success = match recommendation.kind {
            AdaptationKind::RoutingOptimization => self.apply_routing_optimization(),
            AdaptationKind::PerformanceTuning => self.apply_performance_tuning(&recommendation.target),
            AdaptationKind::ThresholdAdjustment => self.apply_threshold_adjustment(),
            // Prompt and model changes live outside the router's authority;
            // record intent only
            AdaptationKind::PromptEnhancement | AdaptationKind::ModelSelection => {
                tracing::info!(
                    "Recorded {} intent for {}",
                    recommendation.kind.as_str(),
                    recommendation.target
                );
                true
            }
        };

        self.push_history(AdaptationRecord {
            timestamp: Utc::now(),
            kind: recommendation.kind,
            target: recommendation.target.clone(),
            description: recommendation.description.clone(),
            success,
            expected_improvement: recommendation.expected_improvement,
            confidence: recommendation.confidence,
        });

        success
    }

    /// Low accuracy: trust learned patterns more readily. High accuracy:
    /// tighten up. Bounded to [0.5, 0.9].
    fn apply_routing_optimization(&self) -> bool {
        let threshold = self.routing.confidence_threshold();
        let new = if self.routing.accuracy() < 0.8 {
            (threshold - 0.1).max(0.5)
        } else {
            (threshold + 0.05).min(0.9)
        };
        self.routing.set_confidence_threshold(new);
        tracing::info!(
            "Adjusted confidence threshold: {:.2} -> {:.2}",
            threshold,
            new
        );
        true
    }

    fn apply_performance_tuning(&self, backend: &str) -> bool {
        match self.registry.reduce_timeout(
            backend,
            self.config.timeout_step_secs,
            self.config.timeout_floor_secs,
        ) {
            Some((old, new)) => {
                tracing::info!("Reduced {} timeout: {}s -> {}s", backend, old, new);
                true
            }
            None => {
                tracing::warn!("Cannot tune timeout for unknown backend {}", backend);
                false
            }
        }
    }

    fn apply_threshold_adjustment(&self) -> bool {
        match self.tracker.avg_success_rate(1) {
            Some(avg) => {
                let new = (avg - 0.05).clamp(0.7, 0.95);
                self.tracker.set_success_rate_threshold(new);
                tracing::info!("Recalibrated success rate alert threshold to {:.3}", new);
                true
            }
            None => false,
        }
    }

    /// Weighted per-backend fitness blended with routing accuracy
    pub fn health_score(&self) -> f64 {
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;

        for (_, metrics) in self.tracker.snapshot() {
            if metrics.sample_size < 5 {
                continue;
            }
            let time_score = (5000.0 / metrics.avg_response_time_ms.max(1.0)).min(1.0);
            let satisfaction_score = (metrics.user_satisfaction / 5.0).min(1.0);
            let model_score =
                metrics.success_rate * 0.4 + time_score * 0.3 + satisfaction_score * 0.3;
            let weight = (metrics.sample_size as f64 / 100.0).min(1.0);
            weighted_sum += model_score * weight;
            weight_total += weight;
        }

        let model_health = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.5
        };

        (model_health * 0.8 + self.routing.accuracy() * 0.2).clamp(0.0, 1.0)
    }

    /// Run one cooldown-guarded cycle: analyze, then apply at most
    /// `max_batch` recommendations.
    pub fn run_cycle(&self) -> CycleOutcome {
        {
            let mut last = self
                .last_adaptation
                .lock()
                .expect("adaptation clock lock poisoned");
            if let Some(at) = *last {
                if at.elapsed() < Duration::from_secs(self.config.interval_secs) {
                    tracing::debug!("Adaptation cycle skipped: within cooldown");
                    return CycleOutcome::skipped();
                }
            }
            *last = Some(Instant::now());
        }

        let recommendations = self.analyze();
        let analyzed = recommendations.len();
        let mut implemented = 0;
        let mut failed = 0;

        for recommendation in recommendations.iter().take(self.config.max_batch) {
            if self.apply(recommendation) {
                implemented += 1;
            } else {
                failed += 1;
            }
        }

        tracing::info!(
            "Adaptation cycle: {} analyzed, {} implemented, {} failed",
            analyzed,
            implemented,
            failed
        );

        CycleOutcome {
            skipped: false,
            analyzed,
            implemented,
            failed,
        }
    }

    /// How often the background runner should poll
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll_interval_secs)
    }

    pub fn history(&self) -> Vec<AdaptationRecord> {
        self.history
            .lock()
            .expect("adaptation history lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    fn push_history(&self, record: AdaptationRecord) {
        let mut history = self
            .history
            .lock()
            .expect("adaptation history lock poisoned");
        if history.len() == self.config.history_cap {
            history.pop_front();
        }
        history.push_back(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LearningConfig, TrackerConfig};
    use crate::patterns::MemoryPatternStore;

    fn build() -> (
        SystemAdaptationEngine,
        Arc<PerformanceTracker>,
        Arc<AdaptiveRoutingEngine>,
        Arc<BackendRegistry>,
    ) {
        let registry = Arc::new(BackendRegistry::from_entries(&Config::default().backends));
        let tracker = Arc::new(PerformanceTracker::new(&TrackerConfig::default()));
        let routing = Arc::new(AdaptiveRoutingEngine::new(
            &LearningConfig::default(),
            Arc::new(MemoryPatternStore::new()),
            registry.clone(),
        ));
        let engine = SystemAdaptationEngine::new(
            AdaptationConfig::default(),
            tracker.clone(),
            routing.clone(),
            registry.clone(),
        );
        (engine, tracker, routing, registry)
    }

    fn record_n(tracker: &PerformanceTracker, backend: &str, n: usize, success: bool, ms: f64) {
        for _ in 0..n {
            tracker.record_interaction(backend, ms, success, Some(4.0));
        }
    }

    #[test]
    fn test_analyze_flags_low_accuracy() {
        let (engine, _, _, _) = build();
        // No outcomes yet, accuracy 0.0 < 0.75
        let recommendations = engine.analyze();
        assert_eq!(
            recommendations[0].kind,
            AdaptationKind::RoutingOptimization
        );
        assert_eq!(recommendations[0].priority, 1);
    }

    #[test]
    fn test_analyze_sorted_by_priority_then_confidence() {
        let (engine, tracker, _, _) = build();
        record_n(&tracker, "slow-model", 10, true, 20000.0);

        let recommendations = engine.analyze();
        for pair in recommendations.windows(2) {
            assert!(pair[0].priority <= pair[1].priority);
            if pair[0].priority == pair[1].priority {
                assert!(pair[0].confidence >= pair[1].confidence);
            }
        }
    }

    #[tokio::test]
    async fn test_threshold_bounds_hold_under_repeated_optimization() {
        let (engine, _, routing, _) = build();
        let rec = AdaptationRecommendation {
            kind: AdaptationKind::RoutingOptimization,
            target: "routing_engine".to_string(),
            description: String::new(),
            expected_improvement: 0.1,
            confidence: 0.8,
            priority: 1,
            rollback_plan: String::new(),
        };

        // Accuracy is 0.0, so every application lowers the threshold
        for _ in 0..20 {
            assert!(engine.apply(&rec));
            let t = routing.confidence_threshold();
            assert!((0.5..=0.9).contains(&t), "threshold out of bounds: {}", t);
        }
        assert!((routing.confidence_threshold() - 0.5).abs() < 1e-9);

        // Drive accuracy high and push the other direction
        routing.set_confidence_threshold(0.88);
        let decision = routing.decide("hello", &[]).await;
        for _ in 0..10 {
            routing.report_outcome(&decision, true).await;
        }
        for _ in 0..10 {
            assert!(engine.apply(&rec));
            assert!(routing.confidence_threshold() <= 0.9);
        }
        assert!((routing.confidence_threshold() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_performance_tuning_reduces_timeout_with_floor() {
        let (engine, _, _, registry) = build();
        let rec = AdaptationRecommendation {
            kind: AdaptationKind::PerformanceTuning,
            target: "codellama:13b".to_string(),
            description: String::new(),
            expected_improvement: 0.1,
            confidence: 0.7,
            priority: 2,
            rollback_plan: String::new(),
        };

        let before = registry.timeout_for("codellama:13b").as_secs();
        assert!(engine.apply(&rec));
        assert_eq!(registry.timeout_for("codellama:13b").as_secs(), before - 5);

        for _ in 0..20 {
            engine.apply(&rec);
        }
        assert_eq!(registry.timeout_for("codellama:13b").as_secs(), 15);
    }

    #[test]
    fn test_performance_tuning_unknown_backend_fails_softly() {
        let (engine, _, _, _) = build();
        let rec = AdaptationRecommendation {
            kind: AdaptationKind::PerformanceTuning,
            target: "no-such-model".to_string(),
            description: String::new(),
            expected_improvement: 0.1,
            confidence: 0.7,
            priority: 2,
            rollback_plan: String::new(),
        };
        assert!(!engine.apply(&rec));
        let history = engine.history();
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
    }

    #[test]
    fn test_threshold_adjustment_recalibrates_alert() {
        let (engine, tracker, _, _) = build();
        record_n(&tracker, "model-a", 10, true, 1000.0);

        let rec = AdaptationRecommendation {
            kind: AdaptationKind::ThresholdAdjustment,
            target: "performance_tracker".to_string(),
            description: String::new(),
            expected_improvement: 0.02,
            confidence: 0.5,
            priority: 5,
            rollback_plan: String::new(),
        };
        assert!(engine.apply(&rec));
        // avg success 1.0 - 0.05 = 0.95, clamped into [0.7, 0.95]
        assert!((tracker.success_rate_threshold() - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_health_score_defaults_to_midpoint() {
        let (engine, _, _, _) = build();
        // No qualifying backends and 0.0 accuracy: 0.5*0.8 + 0.0*0.2
        assert!((engine.health_score() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_health_score_stays_in_range() {
        let (engine, tracker, _, _) = build();
        record_n(&tracker, "great-model", 200, true, 100.0);
        let score = engine.health_score();
        assert!((0.0..=1.0).contains(&score));

        record_n(&tracker, "awful-model", 200, false, 60000.0);
        let score = engine.health_score();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_cycle_respects_cooldown() {
        let (engine, _, _, _) = build();
        let first = engine.run_cycle();
        assert!(!first.skipped);
        assert!(first.analyzed >= 1);

        let second = engine.run_cycle();
        assert!(second.skipped);
        assert_eq!(second.implemented, 0);
    }

    #[test]
    fn test_cycle_applies_at_most_batch_size() {
        let (engine, tracker, _, _) = build();
        // Manufacture many issues
        for model in ["a", "b", "c", "d", "e"] {
            record_n(&tracker, model, 10, false, 30000.0);
        }
        let outcome = engine.run_cycle();
        assert!(outcome.analyzed > 3);
        assert!(outcome.implemented + outcome.failed <= 3);
    }

    #[test]
    fn test_history_is_bounded() {
        let registry = Arc::new(BackendRegistry::from_entries(&Config::default().backends));
        let tracker = Arc::new(PerformanceTracker::new(&TrackerConfig::default()));
        let routing = Arc::new(AdaptiveRoutingEngine::new(
            &LearningConfig::default(),
            Arc::new(MemoryPatternStore::new()),
            registry.clone(),
        ));
        let engine = SystemAdaptationEngine::new(
            AdaptationConfig {
                history_cap: 4,
                ..AdaptationConfig::default()
            },
            tracker,
            routing,
            registry,
        );

        let rec = AdaptationRecommendation {
            kind: AdaptationKind::PromptEnhancement,
            target: "model-a".to_string(),
            description: String::new(),
            expected_improvement: 0.1,
            confidence: 0.6,
            priority: 1,
            rollback_plan: String::new(),
        };
        for _ in 0..10 {
            engine.apply(&rec);
        }
        assert_eq!(engine.history().len(), 4);
    }
}
