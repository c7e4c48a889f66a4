use anyhow::Result;

use kindred::config::KindredConfig;
use kindred::memory::store;
use kindred::training::corpus_stats;

/// Print corpus statistics for every stored turn.
pub fn stats(config: &KindredConfig) -> Result<()> {
    let conn = super::open_db(config)?;
    let turns = store::all_turns(&conn, None)?;
    let report = kindred::db::check_database_health(&conn)?;

    println!("{}", corpus_stats(&turns));
    println!();
    println!("Memory");
    println!("{}", "=".repeat(40));
    println!("  Facts stored:          {}", report.fact_count);
    println!("  Feedback entries:      {}", report.feedback_count);
    Ok(())
}
