// Backend roster - roles, model assignments, timeouts, fallback table

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::BackendEntry;

/// Roles a backend can serve in the escalation chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendRole {
    /// Task classifier (answers "math" or "general")
    Router,
    /// Quantitative / algorithmic specialist
    MathSpecialist,
    /// General-purpose coding model, default primary
    LeadDeveloper,
    /// First fallback, debugging-oriented
    SeniorDeveloper,
    /// Final fallback, architecture-oriented
    PrincipalArchitect,
}

impl BackendRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendRole::Router => "router",
            BackendRole::MathSpecialist => "math_specialist",
            BackendRole::LeadDeveloper => "lead_developer",
            BackendRole::SeniorDeveloper => "senior_developer",
            BackendRole::PrincipalArchitect => "principal_architect",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "router" => Some(BackendRole::Router),
            "math_specialist" => Some(BackendRole::MathSpecialist),
            "lead_developer" => Some(BackendRole::LeadDeveloper),
            "senior_developer" => Some(BackendRole::SeniorDeveloper),
            "principal_architect" => Some(BackendRole::PrincipalArchitect),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-backend settings, keyed by model id in the registry
#[derive(Debug, Clone)]
pub struct BackendSpec {
    pub model: String,
    pub role: BackendRole,
    pub timeout_secs: u64,
    pub temperature: f64,
    pub max_tokens: u32,
    pub enabled: bool,
}

/// Registry of configured backends.
///
/// The role → model assignment and the fallback table are fixed at
/// construction; timeouts and enabled flags are runtime-mutable (the
/// adaptation engine tunes timeouts, connectivity checks toggle enabled).
pub struct BackendRegistry {
    specs: DashMap<String, BackendSpec>,
    by_role: HashMap<BackendRole, String>,
    fallbacks: HashMap<String, Vec<String>>,
}

impl BackendRegistry {
    pub fn from_entries(entries: &[BackendEntry]) -> Self {
        let specs = DashMap::new();
        let mut by_role = HashMap::new();

        for entry in entries {
            let role = match BackendRole::from_str(&entry.role) {
                Some(role) => role,
                None => {
                    tracing::warn!("Unknown backend role '{}', skipping", entry.role);
                    continue;
                }
            };
            by_role.insert(role, entry.model.clone());
            specs.insert(
                entry.model.clone(),
                BackendSpec {
                    model: entry.model.clone(),
                    role,
                    timeout_secs: entry.timeout_secs,
                    temperature: entry.temperature,
                    max_tokens: entry.max_tokens,
                    enabled: entry.enabled,
                },
            );
        }

        let fallbacks = Self::build_fallback_table(&by_role);

        Self {
            specs,
            by_role,
            fallbacks,
        }
    }

    /// Static primary → ordered alternates table. Unknown primaries get the
    /// single general-purpose catch-all.
    fn build_fallback_table(by_role: &HashMap<BackendRole, String>) -> HashMap<String, Vec<String>> {
        let model = |role: BackendRole| by_role.get(&role).cloned().unwrap_or_default();
        let math = model(BackendRole::MathSpecialist);
        let lead = model(BackendRole::LeadDeveloper);
        let senior = model(BackendRole::SeniorDeveloper);
        let architect = model(BackendRole::PrincipalArchitect);

        let mut table = HashMap::new();
        table.insert(math, vec![architect.clone(), lead.clone()]);
        table.insert(lead.clone(), vec![senior.clone(), architect.clone()]);
        table.insert(senior.clone(), vec![lead.clone(), architect.clone()]);
        table.insert(architect, vec![lead, senior]);
        table
    }

    pub fn model_for_role(&self, role: BackendRole) -> Option<String> {
        self.by_role.get(&role).cloned()
    }

    pub fn spec(&self, model: &str) -> Option<BackendSpec> {
        self.specs.get(model).map(|s| s.clone())
    }

    pub fn role_for_model(&self, model: &str) -> Option<BackendRole> {
        self.specs.get(model).map(|s| s.role)
    }

    pub fn timeout_for(&self, model: &str) -> Duration {
        let secs = self.specs.get(model).map(|s| s.timeout_secs).unwrap_or(30);
        Duration::from_secs(secs)
    }

    /// Ordered fallback models for a primary, defaulting to the
    /// general-purpose lead developer for unknown primaries.
    pub fn fallback_models(&self, primary: &str) -> Vec<String> {
        match self.fallbacks.get(primary) {
            Some(list) => list.clone(),
            None => self
                .model_for_role(BackendRole::LeadDeveloper)
                .map(|m| vec![m])
                .unwrap_or_default(),
        }
    }

    /// Shave `step` seconds off a backend's timeout, never going below
    /// `floor`. Returns `(old, new)` when the backend exists.
    pub fn reduce_timeout(&self, model: &str, step: u64, floor: u64) -> Option<(u64, u64)> {
        let mut spec = self.specs.get_mut(model)?;
        let old = spec.timeout_secs;
        spec.timeout_secs = floor.max(old.saturating_sub(step));
        Some((old, spec.timeout_secs))
    }

    pub fn set_enabled(&self, model: &str, enabled: bool) {
        if let Some(mut spec) = self.specs.get_mut(model) {
            spec.enabled = enabled;
        }
    }

    pub fn is_enabled(&self, model: &str) -> bool {
        self.specs.get(model).map(|s| s.enabled).unwrap_or(false)
    }

    pub fn models(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.key().clone()).collect()
    }
}
