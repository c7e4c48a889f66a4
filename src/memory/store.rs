//! Data access for turns, facts, and feedback.
//!
//! Every function takes a plain `&Connection`; callers on the async side hold the
//! connection behind `Arc<Mutex<_>>` and run these inside `spawn_blocking`.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::types::{
    ConversationTurn, FactCategory, FactId, MemoryFact, NewTurn, TurnId,
};
use super::{now_ts, parse_column};
use crate::error::ChatError;

const FACT_COLUMNS: &str = "id, user_id, category, key, value, importance, created_ts, updated_ts, \
                            last_accessed, access_count";

const TURN_COLUMNS: &str = "id, user_id, input, response, ts, context, status";

/// Insert a conversation turn and return its id.
pub fn append_turn(conn: &Connection, turn: &NewTurn) -> Result<TurnId, ChatError> {
    conn.execute(
        "INSERT INTO conversations (user_id, input, response, ts, context, status) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            turn.user_id,
            turn.input,
            turn.response,
            now_ts(),
            turn.context.to_string(),
            turn.status.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// The `limit` most recent turns for a user, newest first. `limit == 0` returns all.
pub fn recent_turns(
    conn: &Connection,
    user_id: &str,
    limit: u32,
) -> Result<Vec<ConversationTurn>, ChatError> {
    // SQLite treats a negative LIMIT as "no limit"
    let limit: i64 = if limit == 0 { -1 } else { i64::from(limit) };
    let mut stmt = conn.prepare(&format!(
        "SELECT {TURN_COLUMNS} FROM conversations WHERE user_id = ?1 \
         ORDER BY ts DESC, id DESC LIMIT ?2"
    ))?;
    let turns = stmt
        .query_map(params![user_id, limit], row_to_turn)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(turns)
}

/// Every stored turn, oldest first, optionally restricted to one user.
pub fn all_turns(
    conn: &Connection,
    user_id: Option<&str>,
) -> Result<Vec<ConversationTurn>, ChatError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TURN_COLUMNS} FROM conversations WHERE ?1 IS NULL OR user_id = ?1 \
         ORDER BY ts ASC, id ASC"
    ))?;
    let turns = stmt
        .query_map(params![user_id], row_to_turn)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(turns)
}

/// Insert a fact, or overwrite value, category, and importance of the existing
/// fact with the same `(user_id, key)`. Returns the fact's id.
pub fn upsert_fact(
    conn: &Connection,
    user_id: &str,
    category: FactCategory,
    key: &str,
    value: &str,
    importance: u8,
) -> Result<FactId, ChatError> {
    let now = now_ts();
    let importance = importance.clamp(1, 10);
    let id = conn.query_row(
        "INSERT INTO ai_memory (user_id, category, key, value, importance, created_ts, updated_ts) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) \
         ON CONFLICT(user_id, key) DO UPDATE SET \
             category = excluded.category, \
             value = excluded.value, \
             importance = excluded.importance, \
             updated_ts = excluded.updated_ts \
         RETURNING id",
        params![user_id, category.as_str(), key, value, importance, now],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// All facts for a user, most important first, then most recently updated.
pub fn list_facts(
    conn: &Connection,
    user_id: &str,
    category: Option<FactCategory>,
) -> Result<Vec<MemoryFact>, ChatError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FACT_COLUMNS} FROM ai_memory \
         WHERE user_id = ?1 AND (?2 IS NULL OR category = ?2) \
         ORDER BY importance DESC, updated_ts DESC, id DESC"
    ))?;
    let facts = stmt
        .query_map(params![user_id, category.map(|c| c.as_str())], row_to_fact)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(facts)
}

/// Look up a single fact by key and record the access.
pub fn get_fact(
    conn: &Connection,
    user_id: &str,
    key: &str,
) -> Result<Option<MemoryFact>, ChatError> {
    let updated = conn.execute(
        "UPDATE ai_memory SET access_count = access_count + 1, last_accessed = ?1 \
         WHERE user_id = ?2 AND key = ?3",
        params![now_ts(), user_id, key],
    )?;
    if updated == 0 {
        return Ok(None);
    }
    let fact = conn
        .query_row(
            &format!("SELECT {FACT_COLUMNS} FROM ai_memory WHERE user_id = ?1 AND key = ?2"),
            params![user_id, key],
            row_to_fact,
        )
        .optional()?;
    Ok(fact)
}

/// Facts whose key or value contains `query`, in `list_facts` order.
pub fn search_facts(
    conn: &Connection,
    user_id: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<MemoryFact>, ChatError> {
    let pattern = format!("%{}%", escape_like(query));
    let mut stmt = conn.prepare(&format!(
        "SELECT {FACT_COLUMNS} FROM ai_memory \
         WHERE user_id = ?1 AND (key LIKE ?2 ESCAPE '\\' OR value LIKE ?2 ESCAPE '\\') \
         ORDER BY importance DESC, updated_ts DESC, id DESC LIMIT ?3"
    ))?;
    let facts = stmt
        .query_map(params![user_id, pattern, limit as i64], row_to_fact)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(facts)
}

/// Remove a fact. `Ok(false)` when there was nothing to remove.
pub fn delete_fact(conn: &Connection, user_id: &str, key: &str) -> Result<bool, ChatError> {
    let rows = conn.execute(
        "DELETE FROM ai_memory WHERE user_id = ?1 AND key = ?2",
        params![user_id, key],
    )?;
    Ok(rows > 0)
}

/// Most recent turn id for a user, if any.
pub fn last_turn_id(conn: &Connection, user_id: &str) -> Result<Option<TurnId>, ChatError> {
    let id = conn
        .query_row(
            "SELECT id FROM conversations WHERE user_id = ?1 ORDER BY ts DESC, id DESC LIMIT 1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Store a 1-5 rating, optionally tied to a turn.
pub fn record_feedback(
    conn: &Connection,
    user_id: &str,
    turn_id: Option<TurnId>,
    rating: u8,
    comment: Option<&str>,
) -> Result<i64, ChatError> {
    conn.execute(
        "INSERT INTO ai_feedback (conversation_id, user_id, rating, comment, ts) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![turn_id, user_id, rating.clamp(1, 5), comment, now_ts()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Row counts removed by [`clear_all`].
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ClearResult {
    pub conversations: usize,
    pub facts: usize,
    pub preferences: usize,
    pub feedback: usize,
}

/// Delete every turn, fact, preference, and feedback row in one transaction.
pub fn clear_all(conn: &mut Connection) -> Result<ClearResult, ChatError> {
    let tx = conn.transaction()?;
    // Order matters for the feedback → conversations FK
    let feedback = tx.execute("DELETE FROM ai_feedback", [])?;
    let conversations = tx.execute("DELETE FROM conversations", [])?;
    let facts = tx.execute("DELETE FROM ai_memory", [])?;
    let preferences = tx.execute("DELETE FROM user_preferences", [])?;
    tx.commit()?;
    Ok(ClearResult {
        conversations,
        facts,
        preferences,
        feedback,
    })
}

fn row_to_fact(row: &Row<'_>) -> rusqlite::Result<MemoryFact> {
    Ok(MemoryFact {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category: parse_column(2, row.get(2)?)?,
        key: row.get(3)?,
        value: row.get(4)?,
        importance: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        last_accessed: row.get(8)?,
        access_count: row.get(9)?,
    })
}

fn row_to_turn(row: &Row<'_>) -> rusqlite::Result<ConversationTurn> {
    let context: Option<String> = row.get(5)?;
    Ok(ConversationTurn {
        id: row.get(0)?,
        user_id: row.get(1)?,
        input: row.get(2)?,
        response: row.get(3)?,
        timestamp: row.get(4)?,
        context: context
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(serde_json::Value::Null),
        status: parse_column(6, row.get(6)?)?,
    })
}

fn escape_like(query: &str) -> String {
    query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
