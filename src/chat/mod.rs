pub mod commands;
pub mod exchange;
pub mod repl;
pub mod worker;

pub use exchange::{ChatSession, ExchangeOutcome, ExchangePhase};
