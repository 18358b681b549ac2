// Background adaptation runner

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::engine::SystemAdaptationEngine;

/// Periodic driver for the adaptation engine, polling at the engine's
/// configured interval. The engine's own cooldown decides when a poll turns
/// into a real cycle; `run_cycle` has no await points, so stopping never
/// cuts a cycle short.
pub struct Runner {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Runner {
    pub fn start(engine: Arc<SystemAdaptationEngine>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let poll_interval = engine.poll_interval();

        let handle = tokio::spawn(async move {
            tracing::info!("Adaptation runner started");
            while flag.load(Ordering::SeqCst) {
                let outcome = engine.run_cycle();
                if !outcome.skipped {
                    tracing::info!(
                        "Background adaptation: {} implemented, {} failed",
                        outcome.implemented,
                        outcome.failed
                    );
                }
                tokio::time::sleep(poll_interval).await;
            }
            tracing::info!("Adaptation runner stopped");
        });

        Self {
            running,
            handle: Some(handle),
        }
    }

    pub async fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}
