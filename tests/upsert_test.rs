mod helpers;

use std::thread::sleep;
use std::time::Duration;

use kindred::memory::store::{get_fact, list_facts, upsert_fact};
use kindred::memory::types::FactCategory;

#[test]
fn repeated_upsert_leaves_one_row_with_last_values() {
    let conn = helpers::test_db();
    let writes = [
        (FactCategory::User, "likes chess", 4),
        (FactCategory::Conversation, "taught the Sicilian", 9),
        (FactCategory::User, "loves chess", 6),
    ];
    let mut ids = Vec::new();
    for (category, value, importance) in writes {
        ids.push(upsert_fact(&conn, "alex", category, "user_hobby", value, importance).unwrap());
    }
    assert!(ids.windows(2).all(|w| w[0] == w[1]));

    let facts = list_facts(&conn, "alex", None).unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].value, "loves chess");
    assert_eq!(facts[0].importance, 6);
    assert_eq!(facts[0].category, FactCategory::User);
}

#[test]
fn upsert_keeps_created_and_moves_updated() {
    let conn = helpers::test_db();
    upsert_fact(&conn, "alex", FactCategory::User, "user_city", "Porto", 5).unwrap();
    let before = get_fact(&conn, "alex", "user_city").unwrap().unwrap();
    sleep(Duration::from_millis(2));
    upsert_fact(&conn, "alex", FactCategory::User, "user_city", "Lisbon", 5).unwrap();
    let after = get_fact(&conn, "alex", "user_city").unwrap().unwrap();

    assert_eq!(before.created_at, after.created_at);
    assert!(after.updated_at > before.updated_at);
}

#[test]
fn list_facts_orders_by_importance_then_recency() {
    let conn = helpers::test_db();
    upsert_fact(&conn, "alex", FactCategory::User, "low", "x", 2).unwrap();
    sleep(Duration::from_millis(2));
    upsert_fact(&conn, "alex", FactCategory::User, "old_mid", "x", 6).unwrap();
    sleep(Duration::from_millis(2));
    upsert_fact(&conn, "alex", FactCategory::User, "top", "x", 10).unwrap();
    sleep(Duration::from_millis(2));
    upsert_fact(&conn, "alex", FactCategory::User, "new_mid", "x", 6).unwrap();

    let keys: Vec<_> = list_facts(&conn, "alex", None)
        .unwrap()
        .into_iter()
        .map(|f| f.key)
        .collect();
    assert_eq!(keys, vec!["top", "new_mid", "old_mid", "low"]);

    // touching old_mid makes it the most recently updated of the two
    sleep(Duration::from_millis(2));
    upsert_fact(&conn, "alex", FactCategory::User, "old_mid", "y", 6).unwrap();
    let keys: Vec<_> = list_facts(&conn, "alex", None)
        .unwrap()
        .into_iter()
        .map(|f| f.key)
        .collect();
    assert_eq!(keys, vec!["top", "old_mid", "new_mid", "low"]);
}
