// Task feature extraction
// Turns free-form task text into the signals the routing rules and
// pattern lookups work from

use serde::{Deserialize, Serialize};

const MATH_KEYWORDS: &[&str] = &[
    "algorithm",
    "complexity",
    "optimize",
    "mathematical",
    "calculate",
    "sort",
    "search",
    "graph",
    "tree",
    "dynamic programming",
    "recursion",
];

const ARCHITECTURE_KEYWORDS: &[&str] = &[
    "design",
    "architecture",
    "system",
    "scalable",
    "microservices",
    "pattern",
    "structure",
    "framework",
];

const DEBUG_KEYWORDS: &[&str] = &[
    "debug",
    "error",
    "fix",
    "issue",
    "problem",
    "bug",
    "troubleshoot",
];

const COMPLEXITY_WORDS: &[&str] = &["complex", "advanced", "sophisticated"];

/// Extracted features of one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFeatures {
    pub prompt_length: usize,
    pub word_count: usize,
    pub math_score: usize,
    pub architecture_score: usize,
    pub debug_score: usize,
    pub has_code: bool,
    pub complexity_indicators: usize,
    pub question_marks: usize,
    pub domain_hints: Vec<String>,
    /// Weighted keyword blend clamped to [0, 1]
    pub estimated_complexity: f64,
}

impl TaskFeatures {
    pub fn extract(task: &str, domain_hints: &[String]) -> Self {
        let lower = task.to_lowercase();

        let math_score = count_keywords(&lower, MATH_KEYWORDS);
        let architecture_score = count_keywords(&lower, ARCHITECTURE_KEYWORDS);
        let debug_score = count_keywords(&lower, DEBUG_KEYWORDS);
        let complexity_indicators = count_keywords(&lower, COMPLEXITY_WORDS);

        let estimated_complexity = ((math_score as f64 * 0.3
            + architecture_score as f64 * 0.4
            + complexity_indicators as f64 * 0.3)
            / 5.0)
            .clamp(0.0, 1.0);

        Self {
            prompt_length: task.len(),
            word_count: task.split_whitespace().count(),
            math_score,
            architecture_score,
            debug_score,
            has_code: task.contains("```")
                || task.contains("def ")
                || task.contains("fn ")
                || lower.contains("function"),
            complexity_indicators,
            question_marks: task.matches('?').count(),
            domain_hints: domain_hints.to_vec(),
            estimated_complexity,
        }
    }

    /// Quantized lookup key for the decision cache: raw keyword counts, the
    /// complexity bucket (one decimal scaled to 0-10), and hint count.
    pub fn signature(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            self.math_score,
            self.architecture_score,
            self.debug_score,
            ((self.estimated_complexity * 10.0).round() as i64).clamp(0, 10),
            self.domain_hints.len()
        )
    }

    /// Canonical keywords forwarded to the pattern store
    pub fn pattern_keywords(&self) -> Vec<String> {
        let mut keywords = Vec::new();
        if self.math_score > 0 {
            keywords.push("algorithm".to_string());
            keywords.push("mathematical".to_string());
        }
        if self.architecture_score > 0 {
            keywords.push("architecture".to_string());
            keywords.push("design".to_string());
        }
        if self.debug_score > 0 {
            keywords.push("debug".to_string());
            keywords.push("troubleshoot".to_string());
        }
        keywords
    }
}

fn count_keywords(lower: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| lower.contains(*kw)).count()
}
