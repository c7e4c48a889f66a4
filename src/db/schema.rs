//! SQL DDL for all kindred tables.
//!
//! Defines `conversations`, `ai_memory`, `user_preferences`, `ai_feedback`, and
//! `schema_meta`. All DDL uses `IF NOT EXISTS` for idempotent initialization.
//! Columns added after version 1 live in [`super::migrations`].

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- One row per exchange
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    input TEXT NOT NULL,
    response TEXT NOT NULL,
    ts TEXT NOT NULL,
    context TEXT
);

CREATE INDEX IF NOT EXISTS idx_conversations_user_ts ON conversations(user_id, ts);

-- Learned facts, one live row per (user, key)
CREATE TABLE IF NOT EXISTS ai_memory (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'user' CHECK(category IN ('user','conversation')),
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    importance INTEGER NOT NULL DEFAULT 5 CHECK(importance >= 1 AND importance <= 10),
    created_ts TEXT NOT NULL,
    updated_ts TEXT NOT NULL,
    last_accessed TEXT,
    access_count INTEGER NOT NULL DEFAULT 0,
    UNIQUE(user_id, key)
);

CREATE INDEX IF NOT EXISTS idx_ai_memory_rank ON ai_memory(user_id, importance, updated_ts);

-- Per-user scalar state
CREATE TABLE IF NOT EXISTS user_preferences (
    user_id TEXT PRIMARY KEY,
    memory_window INTEGER NOT NULL DEFAULT 10 CHECK(memory_window >= 0),
    interactions INTEGER NOT NULL DEFAULT 0,
    relationship_level TEXT NOT NULL DEFAULT 'stranger',
    updated_ts TEXT NOT NULL
);

-- Ratings the user gave to responses
CREATE TABLE IF NOT EXISTS ai_feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id INTEGER REFERENCES conversations(id) ON DELETE SET NULL,
    user_id TEXT NOT NULL,
    rating INTEGER NOT NULL CHECK(rating >= 1 AND rating <= 5),
    comment TEXT,
    ts TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"conversations".to_string()));
        assert!(tables.contains(&"ai_memory".to_string()));
        assert!(tables.contains(&"user_preferences".to_string()));
        assert!(tables.contains(&"ai_feedback".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }

    #[test]
    fn ai_memory_rejects_duplicate_user_key() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let insert = "INSERT INTO ai_memory (user_id, key, value, created_ts, updated_ts) \
                      VALUES ('u', 'job', 'x', 't', 't')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
