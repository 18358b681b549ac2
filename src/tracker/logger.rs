// Interaction logger
// Appends one JSONL record per dispatched request to a dated file

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub timestamp: DateTime<Utc>,
    pub task_hash: String,
    pub classification: String,
    pub backend: String,
    pub success: bool,
    pub response_time_ms: u64,
}

impl InteractionRecord {
    pub fn new(
        task_hash: String,
        classification: String,
        backend: String,
        success: bool,
        response_time_ms: u64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            task_hash,
            classification,
            backend,
            success,
            response_time_ms,
        }
    }
}

pub struct InteractionLogger {
    log_dir: PathBuf,
}

impl InteractionLogger {
    pub fn new(log_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
        Ok(Self { log_dir })
    }

    /// Log a record to today's JSONL file
    pub fn log(&self, record: &InteractionRecord) -> Result<()> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let log_file = self.log_dir.join(format!("{}.jsonl", today));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("Failed to open interaction log: {}", log_file.display()))?;

        let json = serde_json::to_string(record).context("Failed to serialize record")?;
        writeln!(file, "{}", json).context("Failed to write record to log")?;

        Ok(())
    }

    /// Hash a task for privacy (SHA256)
    pub fn hash_task(task: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(task.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Read records for a specific date (YYYY-MM-DD)
    pub fn read_records(&self, date: &str) -> Result<Vec<InteractionRecord>> {
        let log_file = self.log_dir.join(format!("{}.jsonl", date));

        if !log_file.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&log_file)
            .with_context(|| format!("Failed to read interaction log: {}", log_file.display()))?;

        contents
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str(line).context("Failed to parse record"))
            .collect()
    }
}
