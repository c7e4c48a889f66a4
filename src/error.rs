//! Error taxonomy for the conversation path.
//!
//! Generation-path variants are shown to the user; extraction-path failures are
//! logged and discarded by the memory worker, so they never reach this type's
//! callers as user-visible errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Network or HTTP failure talking to the completion endpoint.
    #[error("remote service error: {0}")]
    RemoteService(String),

    /// The endpoint rejected the request for rate or quota reasons. Never retried.
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// The endpoint answered with content that could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// SQLite failure. Fatal to the current operation.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// A blocking database task panicked or the connection lock was poisoned.
    #[error("background task failed: {0}")]
    Task(String),
}

impl ChatError {
    /// Short, friendly text for the REPL.
    pub fn user_message(&self) -> String {
        match self {
            Self::RemoteService(_) => {
                "I couldn't reach the AI service just now. Please try again in a moment.".into()
            }
            Self::Quota(_) => {
                "The AI service is rate limiting us. Give it a minute before asking again.".into()
            }
            Self::MalformedResponse(_) => {
                "The AI service sent back something I couldn't read. Try rephrasing?".into()
            }
            Self::Storage(e) => format!("Something went wrong saving our conversation: {e}"),
            Self::Config(msg) => format!("Configuration problem: {msg}"),
            Self::Task(_) => "Something went wrong on my end. Please try again.".into(),
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedResponse(e.to_string())
    }
}
