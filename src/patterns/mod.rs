// Learned routing patterns
// Store interface plus in-memory and SQLite implementations

mod memory;
mod sqlite;

pub use memory::MemoryPatternStore;
pub use sqlite::SqlitePatternStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A learned association between a task shape and a backend.
///
/// Confidence is the Laplace-smoothed success ratio
/// `(successes + 1) / (successes + failures + 2)`: it rises with
/// corroborating successes and falls with failures, and a pattern with no
/// evidence sits at 0.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningPattern {
    pub pattern_id: String,
    pub conditions: PatternConditions,
    /// Recommended backend model id
    pub action: String,
    pub confidence: f64,
    pub success_count: u64,
    pub failure_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

/// The task shape a pattern matches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConditions {
    pub keywords: Vec<String>,
    pub domain_hints: Vec<String>,
    /// `estimated_complexity` rounded to one decimal, scaled to 0-10
    pub complexity_bucket: u8,
}

/// Lookup key shared by both store implementations
pub(crate) fn signature(keywords: &[String], domain_hints: &[String], complexity: f64) -> String {
    let bucket = complexity_bucket(complexity);
    let mut keywords: Vec<&str> = keywords.iter().map(|s| s.as_str()).collect();
    keywords.sort_unstable();
    let mut hints: Vec<&str> = domain_hints.iter().map(|s| s.as_str()).collect();
    hints.sort_unstable();
    format!("{}|{}|{}", keywords.join(","), hints.join(","), bucket)
}

pub(crate) fn complexity_bucket(complexity: f64) -> u8 {
    ((complexity * 10.0).round().clamp(0.0, 10.0)) as u8
}

pub(crate) fn smoothed_confidence(successes: u64, failures: u64) -> f64 {
    (successes as f64 + 1.0) / ((successes + failures) as f64 + 2.0)
}

/// Durable store of learned routing patterns.
///
/// The router treats this as a black box returning `(backend, confidence)`;
/// both methods must tolerate concurrent callers. A store failure is treated
/// upstream as "no learned recommendation", never surfaced to the requester.
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Best matching pattern for a task shape, if any.
    async fn query(
        &self,
        keywords: &[String],
        domain_hints: &[String],
        complexity: f64,
    ) -> Result<Option<(String, f64)>>;

    /// Reinforce or penalize the pattern for a task shape and backend.
    async fn update(
        &self,
        keywords: &[String],
        domain_hints: &[String],
        complexity: f64,
        backend: &str,
        success: bool,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_order_independent() {
        let a = signature(
            &["debug".to_string(), "algorithm".to_string()],
            &["python".to_string()],
            0.42,
        );
        let b = signature(
            &["algorithm".to_string(), "debug".to_string()],
            &["python".to_string()],
            0.44,
        );
        // Same keywords and same 0.4 bucket
        assert_eq!(a, b);
    }

    #[test]
    fn test_complexity_bucket_bounds() {
        assert_eq!(complexity_bucket(0.0), 0);
        assert_eq!(complexity_bucket(1.0), 10);
        assert_eq!(complexity_bucket(0.25), 3);
        assert_eq!(complexity_bucket(2.0), 10);
    }

    #[test]
    fn test_smoothed_confidence() {
        assert!((smoothed_confidence(0, 0) - 0.5).abs() < 1e-9);
        assert!(smoothed_confidence(9, 0) > 0.9);
        assert!(smoothed_confidence(0, 9) < 0.1);
    }
}
