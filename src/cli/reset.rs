//! CLI `reset` command: delete all stored data after confirmation.

use anyhow::{bail, Result};
use std::io::Write;

use kindred::config::KindredConfig;
use kindred::memory::store;

pub fn reset(config: &KindredConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    println!("WARNING: This will permanently delete ALL conversations, memories, preferences, and feedback.");
    println!("Database: {}", db_path.display());
    print!("\nType YES to confirm: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    if input.trim() != "YES" {
        bail!("reset cancelled");
    }

    let mut conn = super::open_db(config)?;
    let cleared = store::clear_all(&mut conn)?;

    println!(
        "Deleted {} conversations, {} memories, {} preference rows, {} feedback entries.",
        cleared.conversations, cleared.facts, cleared.preferences, cleared.feedback
    );
    Ok(())
}
