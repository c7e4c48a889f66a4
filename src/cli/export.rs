//! CLI `export` command: stored turns as fine-tuning JSONL.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};

use kindred::config::KindredConfig;
use kindred::memory::store;
use kindred::training::{export_jsonl, ExportFormat};

/// Write every complete turn (optionally one user's) to `output`, or stdout.
pub fn export(
    config: &KindredConfig,
    format: ExportFormat,
    output: Option<&Path>,
    user: Option<&str>,
) -> Result<()> {
    let conn = super::open_db(config)?;
    let turns = store::all_turns(&conn, user)?;

    let written = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            export_jsonl(&turns, format, BufWriter::new(file))?
        }
        None => export_jsonl(&turns, format, std::io::stdout().lock())?,
    };

    let skipped = turns.len() - written;
    eprintln!(
        "Exported {written} conversations in {} format{}.",
        format.as_str(),
        match output {
            Some(path) => format!(" to {}", path.display()),
            None => String::new(),
        }
    );
    if skipped > 0 {
        eprintln!("Skipped {skipped} incomplete conversations.");
    }
    Ok(())
}
