//! CLI `memories` and `forget` commands.

use anyhow::Result;
use rusqlite::Connection;

use kindred::config::KindredConfig;
use kindred::memory::extract::normalize_key;
use kindred::memory::store;

/// List every fact stored for `user_id`, most important first.
pub fn memories(config: &KindredConfig, user_id: &str) -> Result<()> {
    let conn = super::open_db(config)?;
    let facts = store::list_facts(&conn, user_id, None)?;

    if facts.is_empty() {
        println!("No memories stored for {user_id}.");
        return Ok(());
    }

    println!("Memories for {user_id}");
    println!("{}", "=".repeat(40));
    for f in &facts {
        println!(
            "  [{:>2}] {:<12} {}: {}",
            f.importance,
            f.category.as_str(),
            f.key,
            f.value
        );
    }
    println!();
    println!("{} facts.", facts.len());
    Ok(())
}

pub fn forget(config: &KindredConfig, user_id: &str, key: &str) -> Result<()> {
    let conn = super::open_db(config)?;
    let (key, removed) = forget_fact(&conn, user_id, key)?;
    if removed {
        println!("Forgot '{key}' for {user_id}.");
    } else {
        println!("No memory '{key}' for {user_id}.");
    }
    Ok(())
}

/// Delete by the same normalized key the REPL stores under.
fn forget_fact(conn: &Connection, user_id: &str, key: &str) -> Result<(String, bool)> {
    let key = normalize_key(key);
    let removed = store::delete_fact(conn, user_id, &key)?;
    Ok((key, removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred::memory::types::FactCategory;

    #[test]
    fn forget_matches_normalized_keys() {
        let conn = kindred::db::open_memory_database().unwrap();
        store::upsert_fact(&conn, "alex", FactCategory::User, "favorite_book", "The Hobbit", 5)
            .unwrap();

        let (key, removed) = forget_fact(&conn, "alex", "Favorite Book").unwrap();
        assert_eq!(key, "favorite_book");
        assert!(removed);
        assert!(!forget_fact(&conn, "alex", "favorite book").unwrap().1);
    }
}
