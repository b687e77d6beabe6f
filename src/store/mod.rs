//! Relational store for credentials, reference data and usage aggregates.
//!
//! A single SQLite connection sits behind an async mutex; every call runs on
//! the blocking pool and holds the connection for its whole statement or
//! transaction. Multi-row invariants (one default credential per
//! tenant/provider, one usage row per aggregate key) are enforced by single
//! statements or transactions inside that critical section, never by a
//! read in one call followed by a write in another.

mod credentials;
mod error;
mod reference;
mod unanswered;
mod usage;

pub use credentials::{CredentialRecord, NewCredentialRow, RevokeOutcome};
pub use error::StoreError;
pub use reference::{ModelRecord, ProviderRecord};
pub use unanswered::{NewUnansweredQuestion, UnansweredQuestion, UnansweredWrite};
pub use usage::{UsageIncrement, UsageMetricRow};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS providers (
    id INTEGER PRIMARY KEY NOT NULL,
    slug TEXT NOT NULL UNIQUE COLLATE NOCASE,
    name TEXT NOT NULL,
    base_url TEXT,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS models (
    id INTEGER PRIMARY KEY NOT NULL,
    provider_id INTEGER NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
    slug TEXT NOT NULL COLLATE NOCASE,
    name TEXT NOT NULL,
    context_window INTEGER NOT NULL,
    input_cost_per_1k REAL NOT NULL DEFAULT 0,
    output_cost_per_1k REAL NOT NULL DEFAULT 0,
    active INTEGER NOT NULL DEFAULT 1,
    UNIQUE (provider_id, slug)
);

CREATE TABLE IF NOT EXISTS provider_credentials (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER NOT NULL,
    provider_id INTEGER NOT NULL,
    label TEXT NOT NULL,
    encrypted_key TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    expires_at TEXT,
    last_used_at TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (tenant_id, provider_id, key_hash)
);

CREATE INDEX IF NOT EXISTS idx_credentials_default
    ON provider_credentials(tenant_id, provider_id, is_default);

CREATE TABLE IF NOT EXISTS usage_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER NOT NULL,
    date TEXT NOT NULL,
    metric_type TEXT NOT NULL,
    source TEXT NOT NULL,
    value INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (tenant_id, date, metric_type, source)
);

CREATE TABLE IF NOT EXISTS unanswered_questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER NOT NULL,
    agent_id INTEGER NOT NULL,
    knowledge_base_id INTEGER,
    question TEXT NOT NULL,
    answer TEXT NOT NULL,
    confidence REAL,
    status TEXT NOT NULL DEFAULT 'pending',
    occurrences INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_unanswered_pending
    ON unanswered_questions(agent_id, knowledge_base_id, status);
"#;

/// Handle to the gateway's SQLite database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let conn = Connection::open(&path)?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            conn.execute_batch(SCHEMA)?;
            Ok::<_, StoreError>(conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

        tracing::debug!("Opened gateway database");
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database (tests, dry runs).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let conn = tokio::task::spawn_blocking(|| {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(SCHEMA)?;
            Ok::<_, StoreError>(conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run a closure against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

pub(crate) fn now_string() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
