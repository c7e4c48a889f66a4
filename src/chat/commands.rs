//! `!`-prefixed command parsing and the handlers for everything but chat.

use thiserror::Error;

use super::exchange::ChatSession;
use crate::db;
use crate::error::ChatError;
use crate::memory::context::memory_summary;
use crate::memory::extract::normalize_key;
use crate::memory::types::FactCategory;
use crate::memory::{preferences, store};
use crate::training::{self, ExportFormat};

pub const PREFIX: char = '!';

/// Importance given to facts the user asks us to remember by hand.
const MANUAL_IMPORTANCE: u8 = 5;

/// Most facts `!search` lists.
const SEARCH_LIMIT: usize = 20;

/// Jaro-Winkler score a command name must beat to be suggested.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Canonical command names, in help order.
const COMMANDS: &[&str] = &[
    "ai", "help", "remember", "recall", "search", "forget", "memories", "summary", "memory",
    "feedback", "keys", "export", "stats", "exit",
];

const ALIASES: &[(&str, &str)] = &[
    ("chat", "ai"),
    ("ask", "ai"),
    ("?", "help"),
    ("commands", "help"),
    ("quit", "exit"),
    ("bye", "exit"),
    ("mystats", "stats"),
    ("usage", "stats"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text, or `!ai <text>`.
    Chat(String),
    Help,
    Remember { key: String, value: String },
    Recall(String),
    /// Facts whose key or value contains the text.
    Search(String),
    Forget(String),
    Memories,
    Summary,
    /// Show the recall window, or set it when a number is given.
    Memory(Option<u32>),
    Feedback { rating: u8, comment: Option<String> },
    Keys,
    Export(ExportFormat),
    Stats,
    Exit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command '{name}'. Did you mean '!{suggestion}'?")]
    UnknownWithSuggestion { name: String, suggestion: String },
    #[error("Unknown command '{0}'. Type !help to see what I can do.")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("nothing to do")]
    Empty,
}

/// Parse one input line. Anything without the `!` prefix is chat.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }
    let Some(rest) = line.strip_prefix(PREFIX) else {
        return Ok(Command::Chat(line.to_string()));
    };

    let args = split_args(rest);
    let Some((first, args)) = args.split_first() else {
        return Err(ParseError::Empty);
    };
    let lowered = first.to_lowercase();
    let name = resolve_alias(&lowered).unwrap_or(lowered.as_str());

    match name {
        "ai" => {
            if args.is_empty() {
                return Err(ParseError::Usage("!ai <question>"));
            }
            Ok(Command::Chat(args.join(" ")))
        }
        "help" => Ok(Command::Help),
        "remember" => match args {
            [key, value @ ..] if !value.is_empty() => Ok(Command::Remember {
                key: key.clone(),
                value: value.join(" "),
            }),
            _ => Err(ParseError::Usage("!remember <key> <value>")),
        },
        "recall" => match args {
            [key] => Ok(Command::Recall(key.clone())),
            _ => Err(ParseError::Usage("!recall <key>")),
        },
        "search" => {
            if args.is_empty() {
                return Err(ParseError::Usage("!search <text>"));
            }
            Ok(Command::Search(args.join(" ")))
        }
        "forget" => match args {
            [key] => Ok(Command::Forget(key.clone())),
            _ => Err(ParseError::Usage("!forget <key>")),
        },
        "memories" => Ok(Command::Memories),
        "summary" => Ok(Command::Summary),
        "memory" => match args {
            [] => Ok(Command::Memory(None)),
            [n] => n
                .parse::<u32>()
                .map(|n| Command::Memory(Some(n)))
                .map_err(|_| ParseError::Usage("!memory [number] (0 for unlimited)")),
            _ => Err(ParseError::Usage("!memory [number] (0 for unlimited)")),
        },
        "feedback" => match args {
            [rating, comment @ ..] => match rating.parse::<u8>() {
                Ok(rating @ 1..=5) => Ok(Command::Feedback {
                    rating,
                    comment: (!comment.is_empty()).then(|| comment.join(" ")),
                }),
                _ => Err(ParseError::Usage("!feedback <1-5> [comment]")),
            },
            _ => Err(ParseError::Usage("!feedback <1-5> [comment]")),
        },
        "keys" => Ok(Command::Keys),
        "export" => match args {
            [] => Ok(Command::Export(ExportFormat::Openai)),
            [format] => format
                .parse()
                .map(Command::Export)
                .map_err(|_| ParseError::Usage("!export [openai|llama|alpaca]")),
            _ => Err(ParseError::Usage("!export [openai|llama|alpaca]")),
        },
        "stats" => Ok(Command::Stats),
        "exit" => Ok(Command::Exit),
        _ => Err(match suggest(name) {
            Some(suggestion) => ParseError::UnknownWithSuggestion {
                name: name.to_string(),
                suggestion,
            },
            None => ParseError::Unknown(name.to_string()),
        }),
    }
}

fn resolve_alias(name: &str) -> Option<&'static str> {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
}

/// Closest known command or alias, resolved to its canonical name.
pub fn suggest(unknown: &str) -> Option<String> {
    let mut best_score = SUGGESTION_THRESHOLD;
    let mut best = None;
    let candidates = COMMANDS
        .iter()
        .copied()
        .chain(ALIASES.iter().map(|(alias, _)| *alias));
    for candidate in candidates {
        let score = strsim::jaro_winkler(unknown, candidate);
        if score > best_score {
            best_score = score;
            best = Some(resolve_alias(candidate).unwrap_or(candidate).to_string());
        }
    }
    best
}

/// Split on whitespace, keeping double- or single-quoted runs together.
pub fn split_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_token = false;

    for c in input.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        args.push(current);
    }
    args
}

pub fn help_text() -> String {
    "\
Commands (prefix with !):
  <text>, !ai <text>        Chat (aliases: !chat, !ask)
  !remember <key> <value>   Store something about you
  !recall <key>             Show one stored fact
  !search <text>            Find facts mentioning some text
  !forget <key>             Delete a stored fact
  !memories                 List everything I remember
  !summary                  What I know about you, by importance
  !memory [n]               Show or set how many past turns I recall (0 = all)
  !feedback <1-5> [note]    Rate my last answer
  !keys                     API key status
  !export [format]          Export conversations (openai, llama, alpaca)
  !stats                    Conversation statistics
  !help                     This list (aliases: !?, !commands)
  !exit                     Leave (aliases: !quit, !bye)

Quote arguments that contain spaces: !remember \"favorite book\" \"The Hobbit\""
        .to_string()
}

/// Run a non-chat command and return the text to show.
///
/// `Chat` and `Exit` are handled by the REPL; passing them here is a no-op.
pub async fn execute(session: &ChatSession, command: Command) -> Result<String, ChatError> {
    let user_id = session.user_id().to_string();
    let db = session.db();

    match command {
        Command::Chat(_) | Command::Exit => Ok(String::new()),
        Command::Help => Ok(help_text()),
        Command::Remember { key, value } => {
            let key = normalize_key(&key);
            if key.is_empty() {
                return Ok("That key doesn't have any letters or numbers in it.".into());
            }
            let (k, v) = (key.clone(), value.clone());
            db::call(db, move |conn| {
                store::upsert_fact(conn, &user_id, FactCategory::User, &k, &v, MANUAL_IMPORTANCE)
            })
            .await?;
            Ok(format!("I'll remember that your {key} is: {value}"))
        }
        Command::Recall(key) => {
            let key = normalize_key(&key);
            let lookup = key.clone();
            let fact = db::call(db, move |conn| store::get_fact(conn, &user_id, &lookup)).await?;
            Ok(match fact {
                Some(f) => format!("Your {}: {} (importance {})", f.key, f.value, f.importance),
                None => format!("I don't remember anything about '{key}'."),
            })
        }
        Command::Search(query) => {
            let needle = query.clone();
            let facts = db::call(db, move |conn| {
                store::search_facts(conn, &user_id, &needle, SEARCH_LIMIT)
            })
            .await?;
            if facts.is_empty() {
                return Ok(format!("Nothing I remember mentions '{query}'."));
            }
            let mut out = format!("Memories mentioning '{query}':\n");
            for f in &facts {
                out.push_str(&format!("  [{}] {}: {}\n", f.importance, f.key, f.value));
            }
            Ok(out.trim_end().to_string())
        }
        Command::Forget(key) => {
            let key = normalize_key(&key);
            let target = key.clone();
            let removed =
                db::call(db, move |conn| store::delete_fact(conn, &user_id, &target)).await?;
            Ok(if removed {
                format!("Forgot '{key}'.")
            } else {
                format!("I didn't have anything stored for '{key}'.")
            })
        }
        Command::Memories => {
            let facts = db::call(db, move |conn| store::list_facts(conn, &user_id, None)).await?;
            if facts.is_empty() {
                return Ok("I don't have any memories about you yet.".into());
            }
            let mut out = format!("I remember {} things about you:\n", facts.len());
            for f in &facts {
                out.push_str(&format!(
                    "  [{}] {}: {} ({})\n",
                    f.importance, f.key, f.value, f.category
                ));
            }
            Ok(out.trim_end().to_string())
        }
        Command::Summary => {
            let facts = db::call(db, move |conn| store::list_facts(conn, &user_id, None)).await?;
            Ok(memory_summary(&facts).trim_end().to_string())
        }
        Command::Memory(None) => {
            let default_window = session.memory_config().default_window;
            let prefs = db::call(db, move |conn| {
                preferences::get_preferences(conn, &user_id, default_window)
            })
            .await?;
            Ok(format!(
                "Current conversation memory: {}. Relationship: {} ({} interactions).\n\
                 Use !memory <number> to change it, or !memory 0 for unlimited.",
                describe_window(prefs.memory_window),
                prefs.relationship_level,
                prefs.interactions
            ))
        }
        Command::Memory(Some(n)) => {
            db::call(db, move |conn| preferences::set_memory_window(conn, &user_id, n)).await?;
            Ok(format!("Memory updated to {}.", describe_window(n)))
        }
        Command::Feedback { rating, comment } => {
            db::call(db, move |conn| {
                let turn_id = store::last_turn_id(conn, &user_id)?;
                store::record_feedback(conn, &user_id, turn_id, rating, comment.as_deref())
            })
            .await?;
            Ok(format!("Thanks for the feedback ({rating}/5)!"))
        }
        Command::Keys => {
            let status = session.client().key_status();
            if status.is_empty() {
                return Ok("No API key information available.".into());
            }
            let mut out = format!("API keys: {}\n", status.len());
            for k in &status {
                let state = match (k.available, k.cooldown_secs) {
                    (_, Some(secs)) => format!("cooling down ({secs}s left)"),
                    (true, None) => "available".to_string(),
                    (false, None) => "rate limited".to_string(),
                };
                out.push_str(&format!(
                    "  {} #{}: {}/{} requests this minute, {} errors, {}\n",
                    if k.is_current { "*" } else { " " },
                    k.number,
                    k.requests_this_minute,
                    k.rate_limit,
                    k.errors,
                    state
                ));
            }
            Ok(out.trim_end().to_string())
        }
        Command::Export(format) => {
            let path = training::default_export_name(format);
            let out_path = path.clone();
            let written = db::call(db, move |conn| {
                let turns = store::all_turns(conn, None)?;
                let file = std::fs::File::create(&out_path)
                    .map_err(|e| ChatError::Task(format!("cannot create {out_path}: {e}")))?;
                training::export_jsonl(&turns, format, std::io::BufWriter::new(file))
                    .map_err(|e| ChatError::Task(format!("export failed: {e:#}")))
            })
            .await?;
            Ok(format!(
                "Exported {written} conversations in {} format to {path}",
                format.as_str()
            ))
        }
        Command::Stats => {
            let turns = db::call(db, move |conn| store::all_turns(conn, None)).await?;
            Ok(training::corpus_stats(&turns).to_string())
        }
    }
}

fn describe_window(n: u32) -> String {
    if n == 0 {
        "unlimited".into()
    } else {
        format!("{n} messages")
    }
}
