//! Per-user preferences: recall window and relationship tracking.

use rusqlite::{params, Connection, OptionalExtension};

use super::types::{Preferences, RelationshipLevel};
use super::{now_ts, parse_column};
use crate::error::ChatError;

/// Stored preferences for `user_id`, or defaults (with `default_window`) if none exist.
pub fn get_preferences(
    conn: &Connection,
    user_id: &str,
    default_window: u32,
) -> Result<Preferences, ChatError> {
    let prefs = conn
        .query_row(
            "SELECT memory_window, interactions, relationship_level \
             FROM user_preferences WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(Preferences {
                    user_id: user_id.to_string(),
                    memory_window: row.get(0)?,
                    interactions: row.get(1)?,
                    relationship_level: parse_column(2, row.get(2)?)?,
                })
            },
        )
        .optional()?;

    Ok(prefs.unwrap_or_else(|| Preferences {
        user_id: user_id.to_string(),
        memory_window: default_window,
        interactions: 0,
        relationship_level: RelationshipLevel::Stranger,
    }))
}

/// Set how many recent turns are recalled. `0` recalls all of them.
pub fn set_memory_window(
    conn: &Connection,
    user_id: &str,
    window: u32,
) -> Result<(), ChatError> {
    conn.execute(
        "INSERT INTO user_preferences (user_id, memory_window, updated_ts) VALUES (?1, ?2, ?3) \
         ON CONFLICT(user_id) DO UPDATE SET memory_window = excluded.memory_window, \
                                            updated_ts = excluded.updated_ts",
        params![user_id, window, now_ts()],
    )?;
    Ok(())
}

/// Count one interaction and recompute the relationship level.
pub fn record_interaction(
    conn: &Connection,
    user_id: &str,
    default_window: u32,
) -> Result<Preferences, ChatError> {
    let mut prefs = get_preferences(conn, user_id, default_window)?;
    prefs.interactions += 1;
    let level = RelationshipLevel::from_interactions(prefs.interactions);
    if level != prefs.relationship_level {
        tracing::info!(user_id, from = %prefs.relationship_level, to = %level, "relationship level changed");
    }
    prefs.relationship_level = level;

    conn.execute(
        "INSERT INTO user_preferences (user_id, memory_window, interactions, relationship_level, updated_ts) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(user_id) DO UPDATE SET interactions = excluded.interactions, \
                                            relationship_level = excluded.relationship_level, \
                                            updated_ts = excluded.updated_ts",
        params![
            user_id,
            prefs.memory_window,
            prefs.interactions,
            prefs.relationship_level.as_str(),
            now_ts(),
        ],
    )?;
    Ok(prefs)
}
