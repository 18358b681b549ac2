// In-memory pattern store
// Used in tests and storage-free deployments

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    complexity_bucket, signature, smoothed_confidence, LearningPattern, PatternConditions,
    PatternStore,
};

/// Patterns held per feature signature, one entry per recommended backend.
#[derive(Default)]
pub struct MemoryPatternStore {
    patterns: DashMap<String, HashMap<String, LearningPattern>>,
}

impl MemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.patterns.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PatternStore for MemoryPatternStore {
    async fn query(
        &self,
        keywords: &[String],
        domain_hints: &[String],
        complexity: f64,
    ) -> Result<Option<(String, f64)>> {
        let key = signature(keywords, domain_hints, complexity);
        let best = self.patterns.get(&key).and_then(|entry| {
            entry
                .value()
                .values()
                .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
                .map(|p| (p.action.clone(), p.confidence))
        });
        Ok(best)
    }

    async fn update(
        &self,
        keywords: &[String],
        domain_hints: &[String],
        complexity: f64,
        backend: &str,
        success: bool,
    ) -> Result<()> {
        let key = signature(keywords, domain_hints, complexity);
        let now = Utc::now();
        let mut entry = self.patterns.entry(key).or_default();

        let pattern = entry
            .entry(backend.to_string())
            .or_insert_with(|| LearningPattern {
                pattern_id: Uuid::new_v4().to_string(),
                conditions: PatternConditions {
                    keywords: keywords.to_vec(),
                    domain_hints: domain_hints.to_vec(),
                    complexity_bucket: complexity_bucket(complexity),
                },
                action: backend.to_string(),
                confidence: 0.5,
                success_count: 0,
                failure_count: 0,
                created_at: now,
                last_used: now,
            });

        if success {
            pattern.success_count += 1;
        } else {
            pattern.failure_count += 1;
        }
        pattern.confidence = smoothed_confidence(pattern.success_count, pattern.failure_count);
        pattern.last_used = now;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kws(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_query_empty_store() {
        let store = MemoryPatternStore::new();
        let result = store.query(&kws(&["algorithm"]), &[], 0.5).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_confidence_rises_with_successes() {
        let store = MemoryPatternStore::new();
        let keywords = kws(&["algorithm", "mathematical"]);

        for _ in 0..8 {
            store
                .update(&keywords, &[], 0.5, "mathstral:7b", true)
                .await
                .unwrap();
        }

        let (backend, confidence) = store.query(&keywords, &[], 0.5).await.unwrap().unwrap();
        assert_eq!(backend, "mathstral:7b");
        assert!(confidence > 0.85);
    }

    #[tokio::test]
    async fn test_confidence_falls_with_failures() {
        let store = MemoryPatternStore::new();
        let keywords = kws(&["debug"]);

        store
            .update(&keywords, &[], 0.2, "codellama:13b", true)
            .await
            .unwrap();
        let (_, before) = store.query(&keywords, &[], 0.2).await.unwrap().unwrap();

        for _ in 0..5 {
            store
                .update(&keywords, &[], 0.2, "codellama:13b", false)
                .await
                .unwrap();
        }
        let (_, after) = store.query(&keywords, &[], 0.2).await.unwrap().unwrap();
        assert!(after < before);
    }

    #[tokio::test]
    async fn test_query_picks_highest_confidence_backend() {
        let store = MemoryPatternStore::new();
        let keywords = kws(&["architecture", "design"]);

        for _ in 0..5 {
            store
                .update(&keywords, &[], 0.8, "wizardcoder:13b-python", true)
                .await
                .unwrap();
        }
        store
            .update(&keywords, &[], 0.8, "codellama:13b", false)
            .await
            .unwrap();

        let (backend, _) = store.query(&keywords, &[], 0.8).await.unwrap().unwrap();
        assert_eq!(backend, "wizardcoder:13b-python");
    }

    #[tokio::test]
    async fn test_different_signatures_are_isolated() {
        let store = MemoryPatternStore::new();
        store
            .update(&kws(&["debug"]), &[], 0.2, "codellama:13b", true)
            .await
            .unwrap();

        let other = store.query(&kws(&["algorithm"]), &[], 0.2).await.unwrap();
        assert!(other.is_none());
    }
}
