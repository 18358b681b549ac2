// Configuration structs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
///
/// Immutable after load. Tunables that the adaptation engine adjusts at
/// runtime (confidence threshold, alert thresholds, backend timeouts) are
/// seeded from here but owned by the component that mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ollama server settings
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Backend roster (role → model assignment with per-model knobs)
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendEntry>,

    /// Performance tracker thresholds
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Adaptive routing parameters
    #[serde(default)]
    pub learning: LearningConfig,

    /// Adaptation cycle parameters
    #[serde(default)]
    pub adaptation: AdaptationConfig,

    /// Directory for the interaction JSONL log (defaults to ~/.corvid/metrics)
    #[serde(default)]
    pub metrics_dir: Option<PathBuf>,

    /// Path for the SQLite pattern store (defaults to ~/.corvid/patterns.db)
    #[serde(default)]
    pub pattern_db: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            backends: default_backends(),
            tracker: TrackerConfig::default(),
            learning: LearningConfig::default(),
            adaptation: AdaptationConfig::default(),
            metrics_dir: None,
            pattern_db: None,
        }
    }
}

/// Ollama connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server
    pub host: String,
    /// Timeout for the initial connectivity check in seconds
    pub connect_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

/// A single backend assignment: which model serves which role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEntry {
    /// Role name: "router", "math_specialist", "lead_developer",
    /// "senior_developer", "principal_architect"
    pub role: String,

    /// Ollama model id (e.g. "mathstral:7b")
    pub model: String,

    /// Per-request timeout in seconds (tunable by the adaptation engine)
    pub timeout_secs: u64,

    /// Sampling temperature
    pub temperature: f64,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Whether this backend may be dispatched to
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Default roster, matching the five-model Ollama deployment
fn default_backends() -> Vec<BackendEntry> {
    vec![
        BackendEntry {
            role: "router".to_string(),
            model: "openhermes:7b".to_string(),
            timeout_secs: 30,
            temperature: 0.3,
            max_tokens: 2048,
            enabled: true,
        },
        BackendEntry {
            role: "math_specialist".to_string(),
            model: "mathstral:7b".to_string(),
            timeout_secs: 45,
            temperature: 0.2,
            max_tokens: 4096,
            enabled: true,
        },
        BackendEntry {
            role: "lead_developer".to_string(),
            model: "deepseek-coder-v2:16b-lite-instruct".to_string(),
            timeout_secs: 60,
            temperature: 0.4,
            max_tokens: 8192,
            enabled: true,
        },
        BackendEntry {
            role: "senior_developer".to_string(),
            model: "codellama:13b".to_string(),
            timeout_secs: 45,
            temperature: 0.3,
            max_tokens: 4096,
            enabled: true,
        },
        BackendEntry {
            role: "principal_architect".to_string(),
            model: "wizardcoder:13b-python".to_string(),
            timeout_secs: 60,
            temperature: 0.5,
            max_tokens: 8192,
            enabled: true,
        },
    ]
}

/// Performance tracker thresholds and window sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Success rate below this is flagged as an issue
    pub success_rate_threshold: f64,
    /// Average response time above this (ms) is flagged
    pub response_time_threshold_ms: f64,
    /// User satisfaction below this is flagged (0 = no ratings yet, skipped)
    pub satisfaction_threshold: f64,
    /// Points kept per `{backend}_{metric}` trend history
    pub history_cap: usize,
    /// Points considered by the linear-fit trend
    pub trend_window: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            success_rate_threshold: 0.85,
            response_time_threshold_ms: 10_000.0,
            satisfaction_threshold: 4.0,
            history_cap: 1000,
            trend_window: 50,
        }
    }
}

/// Adaptive routing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Minimum confidence a learned pattern needs to override the rule engine
    pub confidence_threshold: f64,
    /// TTL of the feature-signature → recommendation cache in seconds
    pub cache_ttl_secs: u64,
    /// Rolling routing-accuracy history length
    pub accuracy_history_cap: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.75,
            cache_ttl_secs: 300,
            accuracy_history_cap: 1000,
        }
    }
}

/// Adaptation cycle parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationConfig {
    /// Minimum seconds between adaptation cycles
    pub interval_secs: u64,
    /// Seconds between background runner polls (the cooldown above decides
    /// whether a poll turns into a real cycle)
    pub poll_interval_secs: u64,
    /// Routing accuracy below this triggers a routing_optimization
    pub accuracy_threshold: f64,
    /// At most this many recommendations applied per cycle
    pub max_batch: usize,
    /// Seconds shaved off a slow backend's timeout per tuning step
    pub timeout_step_secs: u64,
    /// Timeouts are never tuned below this many seconds
    pub timeout_floor_secs: u64,
    /// Entries kept in the adaptation history log
    pub history_cap: usize,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            poll_interval_secs: 60,
            accuracy_threshold: 0.75,
            max_batch: 3,
            timeout_step_secs: 5,
            timeout_floor_secs: 15,
            history_cap: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backends_cover_all_roles() {
        let config = Config::default();
        let roles: Vec<&str> = config.backends.iter().map(|b| b.role.as_str()).collect();
        for role in [
            "router",
            "math_specialist",
            "lead_developer",
            "senior_developer",
            "principal_architect",
        ] {
            assert!(roles.contains(&role), "missing role {}", role);
        }
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.backends.len(), config.backends.len());
        assert_eq!(parsed.learning.confidence_threshold, 0.75);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: Config = toml::from_str("[ollama]\nhost = \"http://10.0.0.2:11434\"\nconnect_timeout_secs = 5\n").unwrap();
        assert_eq!(parsed.ollama.host, "http://10.0.0.2:11434");
        assert_eq!(parsed.backends.len(), 5);
        assert_eq!(parsed.adaptation.max_batch, 3);
    }
}
