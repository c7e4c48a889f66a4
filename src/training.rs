//! Training-data export: stored turns as line-delimited JSON in fine-tuning
//! layouts, plus corpus statistics.

use std::collections::HashSet;
use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};

use crate::memory::types::{ConversationTurn, TurnStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    /// `{"messages": [{"role": "user", ...}, {"role": "assistant", ...}]}`
    Openai,
    /// `{"text": "<s>[INST] ... [/INST] ... </s>"}`
    Llama,
    /// `{"instruction": ..., "input": "", "output": ...}`
    Alpaca,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Llama => "llama",
            Self::Alpaca => "alpaca",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::Openai),
            "llama" => Ok(Self::Llama),
            "alpaca" => Ok(Self::Alpaca),
            _ => Err(format!("unknown export format '{s}' (expected openai, llama, or alpaca)")),
        }
    }
}

pub fn format_turn(turn: &ConversationTurn, format: ExportFormat) -> Value {
    match format {
        ExportFormat::Openai => json!({
            "messages": [
                {"role": "user", "content": turn.input},
                {"role": "assistant", "content": turn.response},
            ]
        }),
        ExportFormat::Llama => json!({
            "text": format!("<s>[INST] {} [/INST] {} </s>", turn.input, turn.response)
        }),
        ExportFormat::Alpaca => json!({
            "instruction": turn.input,
            "input": "",
            "output": turn.response,
        }),
    }
}

/// Write one JSON object per complete turn. Returns the number of lines written.
pub fn export_jsonl<W: Write>(
    turns: &[ConversationTurn],
    format: ExportFormat,
    mut out: W,
) -> Result<usize> {
    let mut written = 0;
    for turn in turns.iter().filter(|t| t.status == TurnStatus::Complete) {
        let line = serde_json::to_string(&format_turn(turn, format))?;
        writeln!(out, "{line}").context("failed to write export line")?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

/// Default export file name: `kindred_export_<format>_<YYYYmmdd_HHMMSS>.jsonl`.
pub fn default_export_name(format: ExportFormat) -> String {
    format!(
        "kindred_export_{}_{}.jsonl",
        format.as_str(),
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    )
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CorpusStats {
    pub total_conversations: usize,
    pub incomplete_conversations: usize,
    pub unique_users: usize,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    /// Mean length in characters.
    pub avg_input_length: f64,
    pub avg_response_length: f64,
}

pub fn corpus_stats(turns: &[ConversationTurn]) -> CorpusStats {
    let users: HashSet<&str> = turns.iter().map(|t| t.user_id.as_str()).collect();
    let mean = |lens: &mut dyn Iterator<Item = usize>| -> f64 {
        if turns.is_empty() {
            0.0
        } else {
            lens.sum::<usize>() as f64 / turns.len() as f64
        }
    };

    CorpusStats {
        total_conversations: turns.len(),
        incomplete_conversations: turns
            .iter()
            .filter(|t| t.status == TurnStatus::Incomplete)
            .count(),
        unique_users: users.len(),
        first_timestamp: turns.iter().map(|t| t.timestamp.clone()).min(),
        last_timestamp: turns.iter().map(|t| t.timestamp.clone()).max(),
        avg_input_length: mean(&mut turns.iter().map(|t| t.input.chars().count())),
        avg_response_length: mean(&mut turns.iter().map(|t| t.response.chars().count())),
    }
}

impl std::fmt::Display for CorpusStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Training Data Statistics")?;
        writeln!(f, "{}", "=".repeat(40))?;
        writeln!(f, "  Total conversations:   {}", self.total_conversations)?;
        writeln!(f, "  Incomplete:            {}", self.incomplete_conversations)?;
        writeln!(f, "  Unique users:          {}", self.unique_users)?;
        if let (Some(first), Some(last)) = (&self.first_timestamp, &self.last_timestamp) {
            writeln!(f, "  First conversation:    {first}")?;
            writeln!(f, "  Last conversation:     {last}")?;
        }
        writeln!(f, "  Avg input length:      {:.1} chars", self.avg_input_length)?;
        write!(f, "  Avg response length:   {:.1} chars", self.avg_response_length)
    }
}
