// SQLite pattern store
// Durable routing patterns in a single local database file

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

use super::{signature, smoothed_confidence, PatternStore};

/// Pattern store backed by SQLite. Upserts are keyed `(signature, backend)`;
/// the connection mutex is held only for the duration of each statement.
pub struct SqlitePatternStore {
    conn: Mutex<Connection>,
}

impl SqlitePatternStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create pattern db directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open pattern db: {}", path.as_ref().display()))?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, handy for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory pattern db")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS routing_patterns (
                signature     TEXT NOT NULL,
                backend       TEXT NOT NULL,
                pattern_id    TEXT NOT NULL,
                success_count INTEGER NOT NULL DEFAULT 0,
                failure_count INTEGER NOT NULL DEFAULT 0,
                confidence    REAL NOT NULL DEFAULT 0.5,
                created_at    TEXT NOT NULL,
                last_used     TEXT NOT NULL,
                PRIMARY KEY (signature, backend)
            );
            CREATE INDEX IF NOT EXISTS idx_patterns_signature
                ON routing_patterns (signature, confidence DESC);",
        )
        .context("Failed to initialize pattern db schema")?;
        Ok(())
    }
}

#[async_trait]
impl PatternStore for SqlitePatternStore {
    async fn query(
        &self,
        keywords: &[String],
        domain_hints: &[String],
        complexity: f64,
    ) -> Result<Option<(String, f64)>> {
        let key = signature(keywords, domain_hints, complexity);
        let conn = self.conn.lock().expect("pattern db lock poisoned");

        let row = conn
            .query_row(
                "SELECT backend, confidence FROM routing_patterns
                 WHERE signature = ?1
                 ORDER BY confidence DESC LIMIT 1",
                params![key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
            )
            .optional()
            .context("Pattern query failed")?;

        Ok(row)
    }

    async fn update(
        &self,
        keywords: &[String],
        domain_hints: &[String],
        complexity: f64,
        backend: &str,
        success: bool,
    ) -> Result<()> {
        let key = signature(keywords, domain_hints, complexity);
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().expect("pattern db lock poisoned");

        conn.execute(
            "INSERT INTO routing_patterns
                 (signature, backend, pattern_id, success_count, failure_count,
                  confidence, created_at, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5, 0.5, ?6, ?6)
             ON CONFLICT (signature, backend) DO UPDATE SET
                 success_count = success_count + ?4,
                 failure_count = failure_count + ?5,
                 last_used = ?6",
            params![
                key,
                backend,
                Uuid::new_v4().to_string(),
                if success { 1 } else { 0 },
                if success { 0 } else { 1 },
                now,
            ],
        )
        .context("Pattern upsert failed")?;

        let (successes, failures): (u64, u64) = conn.query_row(
            "SELECT success_count, failure_count FROM routing_patterns
             WHERE signature = ?1 AND backend = ?2",
            params![key, backend],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        conn.execute(
            "UPDATE routing_patterns SET confidence = ?3
             WHERE signature = ?1 AND backend = ?2",
            params![key, backend, smoothed_confidence(successes, failures)],
        )
        .context("Pattern confidence update failed")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kws(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = SqlitePatternStore::open_in_memory().unwrap();
        let keywords = kws(&["algorithm", "mathematical"]);

        for _ in 0..5 {
            store
                .update(&keywords, &[], 0.6, "mathstral:7b", true)
                .await
                .unwrap();
        }

        let (backend, confidence) = store.query(&keywords, &[], 0.6).await.unwrap().unwrap();
        assert_eq!(backend, "mathstral:7b");
        assert!((confidence - 6.0 / 7.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_query_unknown_signature() {
        let store = SqlitePatternStore::open_in_memory().unwrap();
        assert!(store
            .query(&kws(&["debug"]), &[], 0.1)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_best_backend_wins() {
        let store = SqlitePatternStore::open_in_memory().unwrap();
        let keywords = kws(&["architecture", "design"]);

        for _ in 0..4 {
            store
                .update(&keywords, &[], 0.8, "wizardcoder:13b-python", true)
                .await
                .unwrap();
        }
        for _ in 0..4 {
            store
                .update(&keywords, &[], 0.8, "codellama:13b", false)
                .await
                .unwrap();
        }

        let (backend, _) = store.query(&keywords, &[], 0.8).await.unwrap().unwrap();
        assert_eq!(backend, "wizardcoder:13b-python");
    }

    #[tokio::test]
    async fn test_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.db");

        {
            let store = SqlitePatternStore::new(&path).unwrap();
            store
                .update(&kws(&["debug"]), &[], 0.2, "codellama:13b", true)
                .await
                .unwrap();
        }

        let reopened = SqlitePatternStore::new(&path).unwrap();
        let result = reopened.query(&kws(&["debug"]), &[], 0.2).await.unwrap();
        assert_eq!(result.unwrap().0, "codellama:13b");
    }
}
