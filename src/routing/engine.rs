// Adaptive routing engine
// Hybrid rule + learned-pattern decisions with confidence arbitration

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::backends::{BackendRegistry, BackendRole};
use crate::config::LearningConfig;
use crate::patterns::PatternStore;

use super::features::TaskFeatures;

/// Where a decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Learned,
    Rule,
    Fallback,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::Learned => "learned",
            DecisionSource::Rule => "rule",
            DecisionSource::Fallback => "fallback",
        }
    }
}

/// One routing decision, consumed by the director and handed back when the
/// outcome is known. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub backend: String,
    pub confidence: f64,
    pub source: DecisionSource,
    pub reasoning: String,
    pub fallback_backends: Vec<String>,
    pub features: TaskFeatures,
    pub timestamp: DateTime<Utc>,
}

struct CachedRecommendation {
    backend: String,
    confidence: f64,
    cached_at: Instant,
}

/// Learns which backend suits which task shape.
///
/// `decide` is infallible: pattern-store trouble degrades to the rule
/// engine, and anything else degrades to a hard-coded fallback decision.
pub struct AdaptiveRoutingEngine {
    store: Arc<dyn PatternStore>,
    registry: Arc<BackendRegistry>,
    /// Minimum learned-pattern confidence; tuned by the adaptation engine
    confidence_threshold: RwLock<f64>,
    cache: DashMap<String, CachedRecommendation>,
    cache_ttl: Duration,
    accuracy_history: Mutex<VecDeque<f64>>,
    accuracy_cap: usize,
}

impl AdaptiveRoutingEngine {
    pub fn new(
        config: &LearningConfig,
        store: Arc<dyn PatternStore>,
        registry: Arc<BackendRegistry>,
    ) -> Self {
        Self {
            store,
            registry,
            confidence_threshold: RwLock::new(config.confidence_threshold),
            cache: DashMap::new(),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            accuracy_history: Mutex::new(VecDeque::new()),
            accuracy_cap: config.accuracy_history_cap,
        }
    }

    /// Decide which backend should take a task. Never fails.
    pub async fn decide(&self, task: &str, domain_hints: &[String]) -> RoutingDecision {
        let features = TaskFeatures::extract(task, domain_hints);

        let learned = self.learned_recommendation(&features).await;
        let rule = self.rule_recommendation(&features);

        let decision = match rule {
            Some((rule_backend, rule_confidence, rule_reasoning)) => self.arbitrate(
                features,
                learned,
                rule_backend,
                rule_confidence,
                rule_reasoning,
            ),
            // Registry without a general-purpose backend: fail soft
            None => self.fallback_decision(features),
        };

        tracing::info!(
            "Routing decision: {} (confidence: {:.3}, source: {})",
            decision.backend,
            decision.confidence,
            decision.source.as_str()
        );

        decision
    }

    fn arbitrate(
        &self,
        features: TaskFeatures,
        learned: Option<(String, f64)>,
        rule_backend: String,
        rule_confidence: f64,
        rule_reasoning: String,
    ) -> RoutingDecision {
        let threshold = self.confidence_threshold();

        let (backend, mut confidence, source, mut reasoning) = match &learned {
            Some((backend, learned_confidence)) if *learned_confidence >= threshold => (
                backend.clone(),
                *learned_confidence,
                DecisionSource::Learned,
                format!("Pattern match with {:.3} confidence", learned_confidence),
            ),
            _ => (
                rule_backend.clone(),
                rule_confidence,
                DecisionSource::Rule,
                rule_reasoning,
            ),
        };

        // Agreement between the two recommenders corroborates the choice,
        // whichever of them was selected
        if let Some((learned_backend, _)) = &learned {
            if *learned_backend == rule_backend {
                confidence = (confidence + 0.2).min(1.0);
                reasoning.push_str(" (confirmed by patterns)");
            }
        }

        RoutingDecision {
            fallback_backends: self.registry.fallback_models(&backend),
            backend,
            confidence,
            source,
            reasoning,
            features,
            timestamp: Utc::now(),
        }
    }

    /// Learned recommendation via TTL cache, then the pattern store.
    /// Store failures are logged and treated as a miss.
    async fn learned_recommendation(&self, features: &TaskFeatures) -> Option<(String, f64)> {
        let signature = features.signature();

        if let Some(cached) = self.cache.get(&signature) {
            if cached.cached_at.elapsed() < self.cache_ttl {
                return Some((cached.backend.clone(), cached.confidence));
            }
        }

        let keywords = features.pattern_keywords();
        let result = self
            .store
            .query(
                &keywords,
                &features.domain_hints,
                features.estimated_complexity,
            )
            .await;

        let recommendation = match result {
            Ok(recommendation) => recommendation,
            Err(e) => {
                tracing::warn!("Pattern store query failed: {}", e);
                None
            }
        };

        if let Some((backend, confidence)) = &recommendation {
            self.cache.insert(
                signature,
                CachedRecommendation {
                    backend: backend.clone(),
                    confidence: *confidence,
                    cached_at: Instant::now(),
                },
            );
        }

        recommendation
    }

    /// Keyword rules, always computable. Returns `None` only when the
    /// registry has no backend for the matched role.
    fn rule_recommendation(&self, features: &TaskFeatures) -> Option<(String, f64, String)> {
        if features.math_score >= 2 {
            let model = self.registry.model_for_role(BackendRole::MathSpecialist)?;
            return Some((
                model,
                0.8,
                format!("High math score: {}", features.math_score),
            ));
        }

        if features.architecture_score >= 2 || features.estimated_complexity > 0.7 {
            let model = self
                .registry
                .model_for_role(BackendRole::PrincipalArchitect)?;
            return Some((model, 0.7, "Architecture/complexity indicators".to_string()));
        }

        if features.debug_score >= 1 {
            let model = self.registry.model_for_role(BackendRole::SeniorDeveloper)?;
            return Some((model, 0.6, "Debug-related request".to_string()));
        }

        let model = self.registry.model_for_role(BackendRole::LeadDeveloper)?;
        Some((model, 0.5, "Default general coding model".to_string()))
    }

    /// Hard-coded last resort; this path must never raise.
    fn fallback_decision(&self, features: TaskFeatures) -> RoutingDecision {
        let backend = self
            .registry
            .model_for_role(BackendRole::LeadDeveloper)
            .unwrap_or_else(|| "deepseek-coder-v2:16b-lite-instruct".to_string());
        let fallback_backends = vec![
            self.registry
                .model_for_role(BackendRole::SeniorDeveloper)
                .unwrap_or_else(|| "codellama:13b".to_string()),
            self.registry
                .model_for_role(BackendRole::PrincipalArchitect)
                .unwrap_or_else(|| "wizardcoder:13b-python".to_string()),
        ];

        RoutingDecision {
            backend,
            confidence: 0.3,
            source: DecisionSource::Fallback,
            reasoning: "Fallback routing due to system error".to_string(),
            fallback_backends,
            features,
            timestamp: Utc::now(),
        }
    }

    /// Feed the observed outcome back into the pattern store and the rolling
    /// accuracy history, then drop the decision cache so the next decisions
    /// see fresh evidence.
    pub async fn report_outcome(&self, decision: &RoutingDecision, success: bool) {
        let features = &decision.features;
        let keywords = features.pattern_keywords();

        if let Err(e) = self
            .store
            .update(
                &keywords,
                &features.domain_hints,
                features.estimated_complexity,
                &decision.backend,
                success,
            )
            .await
        {
            tracing::warn!("Pattern store update failed: {}", e);
        }

        {
            let mut history = self
                .accuracy_history
                .lock()
                .expect("accuracy history lock poisoned");
            if history.len() == self.accuracy_cap {
                history.pop_front();
            }
            history.push_back(if success { 1.0 } else { 0.0 });
        }

        self.cache.clear();
        tracing::debug!("Updated routing patterns: success={}", success);
    }

    /// Mean of the rolling accuracy history, 0.0 when empty
    pub fn accuracy(&self) -> f64 {
        let history = self
            .accuracy_history
            .lock()
            .expect("accuracy history lock poisoned");
        if history.is_empty() {
            return 0.0;
        }
        history.iter().sum::<f64>() / history.len() as f64
    }

    pub fn confidence_threshold(&self) -> f64 {
        *self
            .confidence_threshold
            .read()
            .expect("confidence threshold lock poisoned")
    }

    pub(crate) fn set_confidence_threshold(&self, value: f64) {
        *self
            .confidence_threshold
            .write()
            .expect("confidence threshold lock poisoned") = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::patterns::MemoryPatternStore;
    use anyhow::Result;
    use async_trait::async_trait;

    /// Store that always answers with one fixed recommendation
    struct FixedStore {
        reply: Option<(String, f64)>,
    }

    #[async_trait]
    impl PatternStore for FixedStore {
        async fn query(&self, _: &[String], _: &[String], _: f64) -> Result<Option<(String, f64)>> {
            Ok(self.reply.clone())
        }

        async fn update(&self, _: &[String], _: &[String], _: f64, _: &str, _: bool) -> Result<()> {
            Ok(())
        }
    }

    /// Store whose every call fails
    struct BrokenStore;

    #[async_trait]
    impl PatternStore for BrokenStore {
        async fn query(&self, _: &[String], _: &[String], _: f64) -> Result<Option<(String, f64)>> {
            anyhow::bail!("store offline")
        }

        async fn update(&self, _: &[String], _: &[String], _: f64, _: &str, _: bool) -> Result<()> {
            anyhow::bail!("store offline")
        }
    }

    fn registry() -> Arc<BackendRegistry> {
        Arc::new(BackendRegistry::from_entries(&Config::default().backends))
    }

    fn engine_with(store: Arc<dyn PatternStore>) -> AdaptiveRoutingEngine {
        AdaptiveRoutingEngine::new(&LearningConfig::default(), store, registry())
    }

    #[tokio::test]
    async fn test_rule_routes_math_task_to_specialist() {
        let engine = engine_with(Arc::new(MemoryPatternStore::new()));
        let decision = engine
            .decide("optimize this algorithm and reduce its complexity", &[])
            .await;

        assert_eq!(decision.backend, "mathstral:7b");
        assert_eq!(decision.source, DecisionSource::Rule);
        assert!((decision.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rule_routes_debug_task() {
        let engine = engine_with(Arc::new(MemoryPatternStore::new()));
        let decision = engine.decide("fix this bug for me", &[]).await;
        assert_eq!(decision.backend, "codellama:13b");
        assert!((decision.confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rule_default_is_lead_developer() {
        let engine = engine_with(Arc::new(MemoryPatternStore::new()));
        let decision = engine.decide("write a hello world program", &[]).await;
        assert_eq!(decision.backend, "deepseek-coder-v2:16b-lite-instruct");
        assert!((decision.confidence - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_learned_overrides_rule_above_threshold() {
        let engine = engine_with(Arc::new(FixedStore {
            reply: Some(("wizardcoder:13b-python".to_string(), 0.9)),
        }));
        let decision = engine.decide("fix this bug for me", &[]).await;

        assert_eq!(decision.backend, "wizardcoder:13b-python");
        assert_eq!(decision.source, DecisionSource::Learned);
        assert!((decision.confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_learned_below_threshold_falls_back_to_rule() {
        let engine = engine_with(Arc::new(FixedStore {
            reply: Some(("wizardcoder:13b-python".to_string(), 0.5)),
        }));
        let decision = engine.decide("fix this bug for me", &[]).await;

        assert_eq!(decision.backend, "codellama:13b");
        assert_eq!(decision.source, DecisionSource::Rule);
    }

    #[tokio::test]
    async fn test_agreement_boost() {
        // Learned agrees with the rule choice but sits below the threshold:
        // rule wins, confidence gets the +0.2 corroboration boost
        let engine = engine_with(Arc::new(FixedStore {
            reply: Some(("codellama:13b".to_string(), 0.5)),
        }));
        let decision = engine.decide("fix this bug for me", &[]).await;

        assert_eq!(decision.backend, "codellama:13b");
        assert!((decision.confidence - 0.8).abs() < 1e-9); // 0.6 + 0.2
        assert!(decision.reasoning.contains("confirmed by patterns"));
    }

    #[tokio::test]
    async fn test_agreement_boost_caps_at_one() {
        let engine = engine_with(Arc::new(FixedStore {
            reply: Some(("mathstral:7b".to_string(), 0.95)),
        }));
        let decision = engine
            .decide("optimize this algorithm and reduce its complexity", &[])
            .await;

        assert_eq!(decision.backend, "mathstral:7b");
        assert!((decision.confidence - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_store_always_rules() {
        let engine = engine_with(Arc::new(MemoryPatternStore::new()));
        for task in ["fix a bug", "design a scalable system architecture", "hello"] {
            let decision = engine.decide(task, &[]).await;
            assert_eq!(decision.source, DecisionSource::Rule);
        }
    }

    #[tokio::test]
    async fn test_broken_store_degrades_to_rule() {
        let engine = engine_with(Arc::new(BrokenStore));
        let decision = engine.decide("fix this bug for me", &[]).await;
        assert_eq!(decision.backend, "codellama:13b");
        assert_eq!(decision.source, DecisionSource::Rule);

        // report_outcome must also swallow the failure
        engine.report_outcome(&decision, true).await;
        assert!((engine.accuracy() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fallback_list_attached() {
        let engine = engine_with(Arc::new(MemoryPatternStore::new()));
        let decision = engine
            .decide("optimize this algorithm and reduce its complexity", &[])
            .await;
        assert_eq!(
            decision.fallback_backends,
            vec![
                "wizardcoder:13b-python".to_string(),
                "deepseek-coder-v2:16b-lite-instruct".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_accuracy_tracks_outcomes() {
        let engine = engine_with(Arc::new(MemoryPatternStore::new()));
        assert_eq!(engine.accuracy(), 0.0);

        let decision = engine.decide("fix a bug", &[]).await;
        engine.report_outcome(&decision, true).await;
        engine.report_outcome(&decision, true).await;
        engine.report_outcome(&decision, false).await;

        assert!((engine.accuracy() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_outcome_invalidates_cache() {
        let store = Arc::new(MemoryPatternStore::new());
        let engine = engine_with(store.clone());

        // Prime the store so the signature caches a recommendation
        let decision = engine.decide("fix a bug", &[]).await;
        for _ in 0..10 {
            store
                .update(
                    &decision.features.pattern_keywords(),
                    &[],
                    decision.features.estimated_complexity,
                    "codellama:13b",
                    true,
                )
                .await
                .unwrap();
        }

        let cached = engine.decide("fix a bug", &[]).await;
        assert!(!engine.cache.is_empty());

        engine.report_outcome(&cached, false).await;
        assert!(engine.cache.is_empty());
    }

    #[tokio::test]
    async fn test_threshold_accessor() {
        let engine = engine_with(Arc::new(MemoryPatternStore::new()));
        assert!((engine.confidence_threshold() - 0.75).abs() < 1e-9);
        engine.set_confidence_threshold(0.6);
        assert!((engine.confidence_threshold() - 0.6).abs() < 1e-9);
    }
}
