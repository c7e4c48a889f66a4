mod helpers;

use kindred::memory::context::{assemble_context, memory_summary, ContextBudget};
use kindred::memory::store::{append_turn, list_facts, recent_turns, upsert_fact};
use kindred::memory::types::{FactCategory, NewTurn, TurnStatus};

fn seed_facts(conn: &rusqlite::Connection) {
    upsert_fact(conn, "alex", FactCategory::User, "user_name", "Alex", 10).unwrap();
    upsert_fact(conn, "alex", FactCategory::User, "user_hobby", "chess", 6).unwrap();
    upsert_fact(conn, "alex", FactCategory::Conversation, "ai_recommended", "the Sicilian defence", 5).unwrap();
    upsert_fact(conn, "alex", FactCategory::User, "user_snack", "pretzels", 1).unwrap();
}

#[test]
fn stored_facts_render_in_sections() {
    let conn = helpers::test_db();
    seed_facts(&conn);
    let facts = list_facts(&conn, "alex", None).unwrap();

    let block = assemble_context(&facts, &[], &ContextBudget::default());
    assert!(block.starts_with("Things you know about this user:\n- user_name: Alex"));
    assert!(block.contains("Previous topics and things you discussed:\n- ai_recommended: the Sicilian defence"));
    assert!(block.contains("- user_snack: pretzels"));
}

#[test]
fn tight_budget_drops_least_important_first() {
    let conn = helpers::test_db();
    seed_facts(&conn);
    let facts = list_facts(&conn, "alex", None).unwrap();

    let budget = ContextBudget {
        max_chars: 80,
        snippet_chars: 100,
    };
    let block = assemble_context(&facts, &[], &budget);
    assert!(block.chars().count() <= 80);
    assert!(block.contains("user_name: Alex"));
    assert!(!block.contains("pretzels"));
}

#[test]
fn snippets_follow_facts_and_are_truncated() {
    let conn = helpers::test_db();
    seed_facts(&conn);
    append_turn(
        &conn,
        &NewTurn {
            user_id: "alex".into(),
            input: "x".repeat(300),
            response: "short answer".into(),
            context: serde_json::json!({}),
            status: TurnStatus::Complete,
        },
    )
    .unwrap();

    let facts = list_facts(&conn, "alex", None).unwrap();
    let turns = recent_turns(&conn, "alex", 10).unwrap();
    let block = assemble_context(&facts, &turns, &ContextBudget::default());

    let snippets = block.find("Recent conversation snippets:").unwrap();
    assert!(snippets > block.find("user_name").unwrap());
    assert!(block.contains(&format!("User: {}...", "x".repeat(97))));
    assert!(block.contains("You: short answer"));
}

#[test]
fn summary_groups_by_importance() {
    let conn = helpers::test_db();
    seed_facts(&conn);
    let facts = list_facts(&conn, "alex", None).unwrap();

    let summary = memory_summary(&facts);
    let important = summary.find("Important").unwrap();
    let prefs = summary.find("Preferences").unwrap();
    let other = summary.find("Other").unwrap();
    assert!(important < prefs && prefs < other);
    assert!(summary[important..prefs].contains("Alex"));
    assert!(summary[other..].contains("pretzels"));
}

#[test]
fn budget_holds_for_large_stores() {
    let conn = helpers::test_db();
    for i in 0..200 {
        upsert_fact(&conn, "alex", FactCategory::User, &format!("fact_{i}"), &"v".repeat(i % 50 + 1), (i % 10 + 1) as u8).unwrap();
    }
    let facts = list_facts(&conn, "alex", None).unwrap();
    for max_chars in [0, 1, 40, 500, 2400] {
        let budget = ContextBudget { max_chars, snippet_chars: 100 };
        assert!(assemble_context(&facts, &[], &budget).chars().count() <= max_chars);
    }
}
