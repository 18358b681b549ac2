// Model invocation layer
//
// This module provides an abstraction over the actual backend calls so the
// director can be exercised against mock backends in tests while production
// code talks to a local Ollama server.

use anyhow::Result;
use async_trait::async_trait;

mod ollama;

pub use ollama::OllamaInvoker;

/// Optional per-call overrides; unset fields use the backend's configured
/// defaults.
#[derive(Debug, Clone, Default)]
pub struct InvokeParams {
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl InvokeParams {
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }
}

/// A completed backend call. An empty `content` is a legitimate reply, not
/// an error - the fallback chain treats blank content as a failed attempt.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub content: String,
    pub backend: String,
    pub response_time_ms: u64,
}

impl ModelReply {
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Health snapshot of the backend fleet
#[derive(Debug, Clone)]
pub struct BackendHealth {
    pub connected: bool,
    pub models_available: usize,
    pub models_enabled: usize,
    pub issues: Vec<String>,
}

/// Trait for backend model invocation
///
/// Implementations must enforce the per-backend timeout and return a reply
/// with empty content (rather than an error) when the model legitimately
/// produces nothing.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Establish connectivity and verify model availability. Idempotent;
    /// called lazily by the director before the first dispatch.
    async fn connect(&self) -> Result<()>;

    /// Invoke a backend with an enforced timeout.
    async fn invoke(&self, backend: &str, prompt: &str, params: InvokeParams) -> Result<ModelReply>;

    /// Check connection and per-model availability.
    async fn health_check(&self) -> BackendHealth;
}
