//! CLI `doctor` command: database and API diagnostics.

use anyhow::{Context, Result};

use kindred::config::KindredConfig;
use kindred::db;

pub fn doctor(config: &KindredConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    println!("Kindred Health Report");
    println!("=====================");
    println!();
    println!("API:");
    println!("  Endpoint:        {}", config.api.base_url);
    println!("  Model:           {}", config.api.model);
    if config.api.api_keys.is_empty() {
        println!("  Keys:            NONE (set GEMINI_API_KEY)");
    } else {
        println!(
            "  Keys:            {} ({} requests/min each)",
            config.api.api_keys.len(),
            config.api.rate_limit_per_key
        );
    }
    println!();

    if !db_path.exists() {
        println!("Database:          not found at {}", db_path.display());
        println!("Run `kindred chat` to create it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Row counts:");
    println!("  Conversations:   {}", report.conversation_count);
    println!("  Memories:        {}", report.fact_count);
    println!("  Users:           {}", report.user_count);
    println!("  Feedback:        {}", report.feedback_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db ~/.kindred/kindred.db");
        println!("  2. Or export what is readable and start fresh:");
        println!("     kindred export --output backup.jsonl");
        println!("     kindred reset");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
