// Corvid - adaptive multi-model router for local coding LLMs
// Main entry point

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use corvid::adaptation::SystemAdaptationEngine;
use corvid::backends::BackendRegistry;
use corvid::config::{load_config, Config};
use corvid::director::{RequestDirector, TaskContext};
use corvid::invoker::OllamaInvoker;
use corvid::patterns::{MemoryPatternStore, PatternStore, SqlitePatternStore};
use corvid::routing::AdaptiveRoutingEngine;
use corvid::tracker::{InteractionLogger, PerformanceTracker};

#[derive(Parser)]
#[command(name = "corvid", version, about = "Adaptive multi-model router for local coding LLMs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Route a task to the best backend and print the response
    Ask {
        /// The task or question
        task: String,

        /// Programming language hint
        #[arg(long)]
        language: Option<String>,

        /// Domain hints for pattern matching
        #[arg(long = "hint")]
        hints: Vec<String>,
    },

    /// Show backend connectivity and the overall health score
    Health,

    /// Run one adaptation cycle now
    Adapt,

    /// Print the rolling routing accuracy
    Accuracy,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config()?;
    let director = build_director(&config)?;

    match cli.command {
        Command::Ask {
            task,
            language,
            hints,
        } => {
            let context = TaskContext {
                language,
                domain_hints: hints,
            };
            match director.handle(&task, &context).await {
                Ok(response) => {
                    eprintln!(
                        "[{} via {}]",
                        response.classification, response.responding_backend
                    );
                    println!("{}", response.content);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Command::Health => {
            let health = director.backend_health().await;
            println!("Connected: {}", health.connected);
            println!(
                "Models: {} available, {} enabled",
                health.models_available, health.models_enabled
            );
            for issue in &health.issues {
                println!("Issue: {}", issue);
            }
            println!("Health score: {:.3}", director.health_score());
        }
        Command::Adapt => {
            let outcome = director.run_adaptation_cycle();
            if outcome.skipped {
                println!("Skipped: within cooldown interval");
            } else {
                println!(
                    "Analyzed {}, implemented {}, failed {}",
                    outcome.analyzed, outcome.implemented, outcome.failed
                );
            }
        }
        Command::Accuracy => {
            println!("Routing accuracy: {:.3}", director.routing_accuracy());
        }
    }

    Ok(())
}

fn build_director(config: &Config) -> Result<RequestDirector> {
    let registry = Arc::new(BackendRegistry::from_entries(&config.backends));

    let invoker = Arc::new(OllamaInvoker::new(
        config.ollama.host.clone(),
        Duration::from_secs(config.ollama.connect_timeout_secs),
        registry.clone(),
    )?);

    let store = open_pattern_store(config);
    let tracker = Arc::new(PerformanceTracker::new(&config.tracker));
    let routing = Arc::new(AdaptiveRoutingEngine::new(
        &config.learning,
        store,
        registry.clone(),
    ));
    let adaptation = Arc::new(SystemAdaptationEngine::new(
        config.adaptation.clone(),
        tracker.clone(),
        routing.clone(),
        registry.clone(),
    ));

    let logger = match metrics_dir(config) {
        Some(dir) => match InteractionLogger::new(dir) {
            Ok(logger) => Some(logger),
            Err(e) => {
                tracing::warn!("Interaction logging disabled: {}", e);
                None
            }
        },
        None => None,
    };

    Ok(RequestDirector::new(
        invoker, registry, tracker, routing, adaptation, logger,
    ))
}

/// SQLite store at the configured (or default) path, with an in-memory
/// fallback when the database cannot be opened
fn open_pattern_store(config: &Config) -> Arc<dyn PatternStore> {
    let path = config
        .pattern_db
        .clone()
        .or_else(|| corvid_dir().map(|d| d.join("patterns.db")));

    match path {
        Some(path) => match SqlitePatternStore::new(&path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!(
                    "Failed to open pattern database {}: {}; using in-memory store",
                    path.display(),
                    e
                );
                Arc::new(MemoryPatternStore::new())
            }
        },
        None => Arc::new(MemoryPatternStore::new()),
    }
}

fn metrics_dir(config: &Config) -> Option<PathBuf> {
    config
        .metrics_dir
        .clone()
        .or_else(|| corvid_dir().map(|d| d.join("metrics")))
}

fn corvid_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".corvid"))
}
