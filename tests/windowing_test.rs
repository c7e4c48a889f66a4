mod helpers;

use kindred::memory::preferences::set_memory_window;
use kindred::memory::store::{append_turn, recent_turns};
use kindred::memory::types::{NewTurn, TurnStatus};

fn seed(conn: &rusqlite::Connection, user: &str, n: usize) {
    for i in 0..n {
        append_turn(
            conn,
            &NewTurn {
                user_id: user.into(),
                input: format!("question {i}"),
                response: format!("answer {i}"),
                context: serde_json::json!({}),
                status: TurnStatus::Complete,
            },
        )
        .unwrap();
    }
}

#[test]
fn limit_returns_most_recent_first() {
    let conn = helpers::test_db();
    seed(&conn, "alex", 5);

    let turns = recent_turns(&conn, "alex", 3).unwrap();
    let inputs: Vec<_> = turns.iter().map(|t| t.input.as_str()).collect();
    assert_eq!(inputs, vec!["question 4", "question 3", "question 2"]);
}

#[test]
fn zero_means_everything() {
    let conn = helpers::test_db();
    seed(&conn, "alex", 12);
    assert_eq!(recent_turns(&conn, "alex", 0).unwrap().len(), 12);
}

#[test]
fn limit_larger_than_history() {
    let conn = helpers::test_db();
    seed(&conn, "alex", 2);
    assert_eq!(recent_turns(&conn, "alex", 50).unwrap().len(), 2);
    assert!(recent_turns(&conn, "nobody", 50).unwrap().is_empty());
}

#[test]
fn windows_are_per_user() {
    let conn = helpers::test_db();
    seed(&conn, "alex", 3);
    seed(&conn, "sam", 4);
    assert_eq!(recent_turns(&conn, "alex", 0).unwrap().len(), 3);
    assert_eq!(recent_turns(&conn, "sam", 2).unwrap().len(), 2);
}

#[tokio::test]
async fn session_recalls_only_the_configured_window() {
    let db = helpers::shared_db();
    {
        let conn = db.lock().unwrap();
        seed(&conn, "alex", 4);
        set_memory_window(&conn, "alex", 1).unwrap();
    }

    let client = helpers::ScriptedClient::new();
    let mut s = helpers::session("alex", &db, &client, helpers::memory_config(false));
    helpers::say(&mut s, "what did we talk about?").await.0.unwrap();

    let prompt = client.last_request().prompt;
    assert!(prompt.contains("question 3"));
    assert!(!prompt.contains("question 2"));
}
