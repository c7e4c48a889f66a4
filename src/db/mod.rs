pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::ChatError;

/// The one connection shared by the session, its extraction worker, and commands.
pub type SharedConnection = Arc<Mutex<Connection>>;

pub fn share(conn: Connection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}

/// Run synchronous store code against the shared connection on the blocking pool.
pub async fn call<T, F>(db: &SharedConnection, f: F) -> Result<T, ChatError>
where
    F: FnOnce(&mut Connection) -> Result<T, ChatError> + Send + 'static,
    T: Send + 'static,
{
    let db = Arc::clone(db);
    tokio::task::spawn_blocking(move || {
        let mut conn = db
            .lock()
            .map_err(|e| ChatError::Task(format!("db lock poisoned: {e}")))?;
        f(&mut conn)
    })
    .await
    .map_err(|e| ChatError::Task(format!("db task failed: {e}")))?
}

/// Open (or create) the kindred database at the given path with schema and
/// migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL so a background extraction write never blocks a reader for long
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open a fully migrated in-memory database.
pub fn open_memory_database() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Result of [`check_database_health`].
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub schema_version: u32,
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub conversation_count: u64,
    pub fact_count: u64,
    pub user_count: u64,
    pub feedback_count: u64,
}

/// Run `PRAGMA integrity_check` and collect row counts.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    let schema_version = migrations::get_schema_version(conn)?;

    let count = |sql: &str| -> Result<u64> {
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as u64)
    };

    Ok(HealthReport {
        schema_version,
        integrity_ok: integrity == "ok",
        integrity_details: integrity,
        conversation_count: count("SELECT COUNT(*) FROM conversations")?,
        fact_count: count("SELECT COUNT(*) FROM ai_memory")?,
        user_count: count(
            "SELECT COUNT(*) FROM (SELECT user_id FROM conversations UNION SELECT user_id FROM ai_memory)",
        )?,
        feedback_count: count("SELECT COUNT(*) FROM ai_feedback")?,
    })
}
