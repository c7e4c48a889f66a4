mod helpers;

use kindred::db::{check_database_health, open_database};
use kindred::memory::store::{append_turn, recent_turns, upsert_fact};
use kindred::memory::types::{FactCategory, NewTurn, TurnStatus};

fn turn(user: &str, input: &str) -> NewTurn {
    NewTurn {
        user_id: user.into(),
        input: input.into(),
        response: "ok".into(),
        context: serde_json::json!({"command": "chat"}),
        status: TurnStatus::Complete,
    }
}

#[test]
fn open_creates_parent_dirs_and_sets_pragmas() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("kindred.db");
    let conn = open_database(&path).unwrap();
    assert!(path.exists());

    let mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
    let timeout: i64 = conn
        .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);
    let fks: i64 = conn
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .unwrap();
    assert_eq!(fks, 1);
}

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kindred.db");
    {
        let conn = open_database(&path).unwrap();
        append_turn(&conn, &turn("alex", "hello")).unwrap();
        upsert_fact(&conn, "alex", FactCategory::User, "user_name", "Alex", 10).unwrap();
    }

    let conn = open_database(&path).unwrap();
    let turns = recent_turns(&conn, "alex", 0).unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].context["command"], "chat");

    let report = check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.conversation_count, 1);
    assert_eq!(report.fact_count, 1);
    assert_eq!(report.user_count, 1);
    assert_eq!(report.feedback_count, 0);
}

#[test]
fn health_counts_distinct_users_across_tables() {
    let conn = helpers::test_db();
    append_turn(&conn, &turn("alex", "hi")).unwrap();
    append_turn(&conn, &turn("alex", "hi again")).unwrap();
    upsert_fact(&conn, "sam", FactCategory::User, "user_name", "Sam", 9).unwrap();

    let report = check_database_health(&conn).unwrap();
    assert_eq!(report.conversation_count, 2);
    assert_eq!(report.user_count, 2);
}

#[test]
fn schema_rejects_out_of_range_rows() {
    let conn = helpers::test_db();
    let bad_importance = conn.execute(
        "INSERT INTO ai_memory (user_id, key, value, importance, created_ts, updated_ts) \
         VALUES ('alex', 'k', 'v', 11, 'now', 'now')",
        [],
    );
    assert!(bad_importance.is_err());

    let bad_rating = conn.execute(
        "INSERT INTO ai_feedback (user_id, rating, ts) VALUES ('alex', 0, 'now')",
        [],
    );
    assert!(bad_rating.is_err());
}
