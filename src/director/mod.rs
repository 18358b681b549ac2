// Request director
// Classify, route, walk the fallback chain, record the outcome

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::adaptation::{CycleOutcome, SystemAdaptationEngine};
use crate::backends::{BackendRegistry, BackendRole};
use crate::invoker::{BackendHealth, InvokeParams, ModelInvoker};
use crate::routing::AdaptiveRoutingEngine;
use crate::tracker::{InteractionLogger, InteractionRecord, PerformanceTracker};

const CLASSIFIER_SYSTEM_PROMPT: &str = "You are a task classifier. Reply with exactly one word: \
    'math' if the request is primarily mathematical or algorithmic, otherwise 'general'.";

/// Terminal request failures. Everything recoverable is absorbed by the
/// fallback chain and never reaches the caller.
#[derive(Debug, Error)]
pub enum DirectorError {
    #[error("Task must not be empty")]
    EmptyTask,

    #[error("Backend services unavailable: {0}")]
    ServicesUnavailable(String),

    #[error("All models failed (attempted: {})", attempted.join(", "))]
    AllModelsFailed { attempted: Vec<String> },
}

/// Optional per-request context
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    pub language: Option<String>,
    pub domain_hints: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DirectorResponse {
    pub classification: String,
    pub content: String,
    pub responding_backend: String,
    pub responding_role: BackendRole,
}

/// Entry point for task handling.
///
/// Per request: validate, lazily connect, classify with a fail-soft default,
/// walk the role escalation chain until a non-blank reply, and record the
/// terminal outcome exactly once into the tracker and the routing engine.
pub struct RequestDirector {
    invoker: Arc<dyn ModelInvoker>,
    registry: Arc<BackendRegistry>,
    tracker: Arc<PerformanceTracker>,
    routing: Arc<AdaptiveRoutingEngine>,
    adaptation: Arc<SystemAdaptationEngine>,
    logger: Option<InteractionLogger>,
    connected: AtomicBool,
}

impl RequestDirector {
    pub fn new(
        invoker: Arc<dyn ModelInvoker>,
        registry: Arc<BackendRegistry>,
        tracker: Arc<PerformanceTracker>,
        routing: Arc<AdaptiveRoutingEngine>,
        adaptation: Arc<SystemAdaptationEngine>,
        logger: Option<InteractionLogger>,
    ) -> Self {
        Self {
            invoker,
            registry,
            tracker,
            routing,
            adaptation,
            logger,
            connected: AtomicBool::new(false),
        }
    }

    pub async fn handle(
        &self,
        task: &str,
        context: &TaskContext,
    ) -> Result<DirectorResponse, DirectorError> {
        if task.trim().is_empty() {
            return Err(DirectorError::EmptyTask);
        }

        self.ensure_connected().await?;

        let decision = self.routing.decide(task, &context.domain_hints).await;
        let classification = self.classify(task).await;
        tracing::info!("Task classified as '{}'", classification);

        let primary_role = match classification.as_str() {
            "math" => BackendRole::MathSpecialist,
            _ => BackendRole::LeadDeveloper,
        };
        let chain = self.escalation_chain(primary_role);
        let prompt = build_prompt(task, context);

        let started = Instant::now();
        let mut attempted = Vec::new();

        for (role, model) in &chain {
            attempted.push(model.clone());
            tracing::debug!("Attempting {} ({})", model, role.as_str());

            match self.invoker.invoke(model, &prompt, InvokeParams::default()).await {
                Ok(reply) if !reply.is_blank() => {
                    self.record_outcome(
                        &decision,
                        task,
                        model,
                        &classification,
                        true,
                        reply.response_time_ms,
                    )
                    .await;
                    return Ok(DirectorResponse {
                        classification,
                        content: reply.content,
                        responding_backend: model.clone(),
                        responding_role: *role,
                    });
                }
                Ok(_) => {
                    tracing::warn!("{} returned blank content, escalating", model);
                }
                Err(e) => {
                    tracing::warn!("{} failed: {}, escalating", model, e);
                }
            }
        }

        // Exhausted: the failure is charged to the chain's primary
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if let Some((_, primary_model)) = chain.first() {
            self.record_outcome(
                &decision,
                task,
                primary_model,
                &classification,
                false,
                elapsed_ms,
            )
            .await;
        }

        Err(DirectorError::AllModelsFailed { attempted })
    }

    /// Idempotent lazy connect. A failure leaves the director retryable on
    /// the next call.
    async fn ensure_connected(&self) -> Result<(), DirectorError> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        match self.invoker.connect().await {
            Ok(()) => {
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => Err(DirectorError::ServicesUnavailable(e.to_string())),
        }
    }

    /// Ask the router model for a label. Anything other than a known label,
    /// including errors, defaults to "general".
    async fn classify(&self, task: &str) -> String {
        let Some(model) = self.registry.model_for_role(BackendRole::Router) else {
            return "general".to_string();
        };

        let params = InvokeParams::default().with_system(CLASSIFIER_SYSTEM_PROMPT);
        match self.invoker.invoke(&model, task, params).await {
            Ok(reply) => {
                let label = reply.content.trim().to_lowercase();
                if label == "math" {
                    "math".to_string()
                } else {
                    "general".to_string()
                }
            }
            Err(e) => {
                tracing::warn!("Classification failed: {}, defaulting to general", e);
                "general".to_string()
            }
        }
    }

    /// `[primary, senior_developer, principal_architect]` with duplicates
    /// removed and roles without a configured model skipped
    fn escalation_chain(&self, primary: BackendRole) -> Vec<(BackendRole, String)> {
        let mut chain = Vec::new();
        for role in [
            primary,
            BackendRole::SeniorDeveloper,
            BackendRole::PrincipalArchitect,
        ] {
            if chain.iter().any(|(r, _)| *r == role) {
                continue;
            }
            if let Some(model) = self.registry.model_for_role(role) {
                chain.push((role, model));
            }
        }
        chain
    }

    async fn record_outcome(
        &self,
        decision: &crate::routing::RoutingDecision,
        task: &str,
        backend: &str,
        classification: &str,
        success: bool,
        response_time_ms: u64,
    ) {
        self.tracker
            .record_interaction(backend, response_time_ms as f64, success, None);

        // Pattern learning is keyed by the backend the outcome belongs to
        let mut reported = decision.clone();
        reported.backend = backend.to_string();
        self.routing.report_outcome(&reported, success).await;

        if let Some(logger) = &self.logger {
            let record = InteractionRecord::new(
                InteractionLogger::hash_task(task),
                classification.to_string(),
                backend.to_string(),
                success,
                response_time_ms,
            );
            if let Err(e) = logger.log(&record) {
                tracing::warn!("Failed to log interaction: {}", e);
            }
        }
    }

    pub fn health_score(&self) -> f64 {
        self.adaptation.health_score()
    }

    pub fn run_adaptation_cycle(&self) -> CycleOutcome {
        self.adaptation.run_cycle()
    }

    pub fn routing_accuracy(&self) -> f64 {
        self.routing.accuracy()
    }

    pub async fn backend_health(&self) -> BackendHealth {
        self.invoker.health_check().await
    }
}

fn build_prompt(task: &str, context: &TaskContext) -> String {
    match &context.language {
        Some(language) => format!("Language: {}\nRequest: {}", language, task),
        None => task.to_string(),
    }
}
