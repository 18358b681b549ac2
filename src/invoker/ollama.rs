// Ollama HTTP client
// Talks to a local Ollama server via /api/chat and /api/tags

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backends::BackendRegistry;

use super::{BackendHealth, InvokeParams, ModelInvoker, ModelReply};

pub struct OllamaInvoker {
    http: reqwest::Client,
    base_url: String,
    connect_timeout: Duration,
    registry: Arc<BackendRegistry>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaInvoker {
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        registry: Arc<BackendRegistry>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            connect_timeout,
            registry,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(self.connect_timeout)
            .send()
            .await
            .with_context(|| format!("Failed to reach Ollama at {}", url))?
            .error_for_status()
            .context("Ollama /api/tags returned an error status")?;

        let tags: TagsResponse = response
            .json()
            .await
            .context("Failed to parse /api/tags response")?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl ModelInvoker for OllamaInvoker {
    async fn connect(&self) -> Result<()> {
        let available = self.list_models().await?;

        let mut missing = Vec::new();
        for model in self.registry.models() {
            if available.iter().any(|m| m == &model) {
                self.registry.set_enabled(&model, true);
            } else {
                self.registry.set_enabled(&model, false);
                missing.push(model);
            }
        }

        if !missing.is_empty() {
            tracing::warn!("Models not available on Ollama: {:?}", missing);
        } else {
            tracing::info!("Connected to Ollama with all configured models");
        }

        Ok(())
    }

    async fn invoke(&self, backend: &str, prompt: &str, params: InvokeParams) -> Result<ModelReply> {
        let spec = self.registry.spec(backend);
        if let Some(spec) = &spec {
            if !spec.enabled {
                anyhow::bail!("Backend {} is disabled", backend);
            }
        }

        let mut messages = Vec::new();
        if let Some(system) = &params.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let temperature = params
            .temperature
            .or(spec.as_ref().map(|s| s.temperature))
            .unwrap_or(0.3);
        let max_tokens = params
            .max_tokens
            .or(spec.as_ref().map(|s| s.max_tokens))
            .unwrap_or(2048);

        let body = json!({
            "model": backend,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            },
        });

        let timeout = self.registry.timeout_for(backend);
        let url = format!("{}/api/chat", self.base_url);
        let start = Instant::now();

        // The timeout spans the whole exchange, body read included, so a
        // stalled response cannot hold up the fallback chain
        let chat: ChatResponse = tokio::time::timeout(timeout, async {
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .with_context(|| format!("Request to backend {} failed", backend))?
                .error_for_status()
                .with_context(|| format!("Backend {} returned an error status", backend))?;

            response
                .json()
                .await
                .with_context(|| format!("Failed to parse reply from backend {}", backend))
        })
        .await
        .with_context(|| format!("Backend {} timed out after {:?}", backend, timeout))??;

        let response_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            "Backend {} replied in {}ms ({} chars)",
            backend,
            response_time_ms,
            chat.message.content.len()
        );

        Ok(ModelReply {
            content: chat.message.content,
            backend: backend.to_string(),
            response_time_ms,
        })
    }

    async fn health_check(&self) -> BackendHealth {
        let mut health = BackendHealth {
            connected: false,
            models_available: 0,
            models_enabled: 0,
            issues: Vec::new(),
        };

        let available = match self.list_models().await {
            Ok(models) => {
                health.connected = true;
                models
            }
            Err(e) => {
                health.issues.push(format!("Connection error: {}", e));
                return health;
            }
        };

        for model in self.registry.models() {
            if available.iter().any(|m| m == &model) {
                health.models_available += 1;
                if self.registry.is_enabled(&model) {
                    health.models_enabled += 1;
                }
            } else {
                health.issues.push(format!("Model {} not available", model));
            }
        }

        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendEntry;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn registry_with(model: &str, timeout_secs: u64) -> Arc<BackendRegistry> {
        Arc::new(BackendRegistry::from_entries(&[BackendEntry {
            role: "lead_developer".to_string(),
            model: model.to_string(),
            timeout_secs,
            temperature: 0.3,
            max_tokens: 1024,
            enabled: true,
        }]))
    }

    #[tokio::test]
    async fn test_timeout_covers_stalled_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Send headers, then hold the connection open mid-body
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\n\
                      content-type: application/json\r\n\
                      content-length: 100000\r\n\r\n\
                      {\"message\":",
                )
                .await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let registry = registry_with("stalled-model", 1);
        let invoker = OllamaInvoker::new(
            format!("http://{}", addr),
            Duration::from_secs(1),
            registry,
        )
        .unwrap();

        let started = Instant::now();
        let result = invoker
            .invoke("stalled-model", "hello", InvokeParams::default())
            .await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_disabled_backend_rejected() {
        let registry = registry_with("off-model", 30);
        registry.set_enabled("off-model", false);

        let invoker = OllamaInvoker::new(
            "http://127.0.0.1:1".to_string(),
            Duration::from_secs(1),
            registry,
        )
        .unwrap();

        let err = invoker
            .invoke("off-model", "hello", InvokeParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
