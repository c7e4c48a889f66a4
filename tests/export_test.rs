mod helpers;

use kindred::db::open_database;
use kindred::memory::store::{all_turns, append_turn};
use kindred::memory::types::{NewTurn, TurnStatus};
use kindred::training::{corpus_stats, export_jsonl, ExportFormat};
use serde_json::Value;

fn seed(conn: &rusqlite::Connection) {
    let rows = [
        ("alex", "What is a fork?", "A move attacking two pieces.", TurnStatus::Complete),
        ("sam", "Tell me a story", "Once upon", TurnStatus::Incomplete),
        ("alex", "And a pin?", "A piece that cannot move.", TurnStatus::Complete),
    ];
    for (user, input, response, status) in rows {
        append_turn(
            conn,
            &NewTurn {
                user_id: user.into(),
                input: input.into(),
                response: response.into(),
                context: serde_json::json!({"command": "chat"}),
                status,
            },
        )
        .unwrap();
    }
}

fn export(conn: &rusqlite::Connection, format: ExportFormat, user: Option<&str>) -> Vec<Value> {
    let turns = all_turns(conn, user).unwrap();
    let mut out = Vec::new();
    let written = export_jsonl(&turns, format, &mut out).unwrap();
    let lines: Vec<Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), written);
    lines
}

#[test]
fn openai_export_skips_incomplete_turns() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_database(dir.path().join("kindred.db")).unwrap();
    seed(&conn);

    let lines = export(&conn, ExportFormat::Openai, None);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["messages"][0]["role"], "user");
    assert_eq!(lines[0]["messages"][0]["content"], "What is a fork?");
    assert_eq!(lines[0]["messages"][1]["role"], "assistant");
    assert_eq!(lines[1]["messages"][0]["content"], "And a pin?");
}

#[test]
fn llama_and_alpaca_layouts() {
    let conn = helpers::test_db();
    seed(&conn);

    let llama = export(&conn, ExportFormat::Llama, Some("alex"));
    assert_eq!(
        llama[0]["text"],
        "<s>[INST] What is a fork? [/INST] A move attacking two pieces. </s>"
    );

    let alpaca = export(&conn, ExportFormat::Alpaca, Some("alex"));
    assert_eq!(alpaca[1]["instruction"], "And a pin?");
    assert_eq!(alpaca[1]["input"], "");
    assert_eq!(alpaca[1]["output"], "A piece that cannot move.");
}

#[test]
fn user_filter_and_stats() {
    let conn = helpers::test_db();
    seed(&conn);

    assert!(export(&conn, ExportFormat::Openai, Some("sam")).is_empty());

    let stats = corpus_stats(&all_turns(&conn, None).unwrap());
    assert_eq!(stats.total_conversations, 3);
    assert_eq!(stats.incomplete_conversations, 1);
    assert_eq!(stats.unique_users, 2);
    assert!(stats.first_timestamp <= stats.last_timestamp);
}
