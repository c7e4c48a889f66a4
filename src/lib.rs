//! Kindred: a terminal AI companion that remembers you.
//!
//! Every exchange with the hosted model is stored in SQLite. After each
//! exchange the model is asked which facts are worth keeping, and those facts
//! are upserted per user. Before the next exchange they are recalled, ranked by
//! importance, and packed into a bounded context block.
//!
//! # Modules
//!
//! - [`config`]: TOML config plus environment overrides
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`memory`]: Store operations, preferences, extraction decoding, context assembly
//! - [`llm`]: `CompletionClient` trait and the Gemini implementation
//! - [`chat`]: Session orchestration, extraction worker, commands, and the REPL
//! - [`training`]: JSONL export of stored turns and corpus statistics

pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod memory;
pub mod training;
