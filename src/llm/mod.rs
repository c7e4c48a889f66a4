//! Remote completion client abstraction.
//!
//! [`CompletionClient`] is the seam between the conversation loop and the
//! hosted model. [`gemini::GeminiClient`] is the production implementation;
//! tests substitute scripted clients.

pub mod gemini;
pub mod keys;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use crate::error::ChatError;
use crate::memory::extract::{build_extraction_prompt, parse_extraction_response};
use crate::memory::types::{Exchange, ExtractedFact};

pub use keys::KeyStatus;

/// Lazy, finite stream of response text chunks.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One prior message replayed to the model as structured history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// System instruction describing the assistant.
    pub persona: String,
    /// Oldest first.
    pub history: Vec<HistoryMessage>,
    pub prompt: String,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Start a streamed completion. Errors before the first chunk come back
    /// here; errors mid-stream come back as stream items.
    async fn complete(&self, request: CompletionRequest) -> Result<TextStream, ChatError>;

    /// Single non-streamed completion of a bare prompt.
    async fn generate(&self, prompt: &str) -> Result<String, ChatError>;

    /// Ask the model which facts in `exchange` are worth remembering.
    ///
    /// Never fails: remote and decode errors are logged and yield no facts.
    async fn extract_facts(&self, exchange: &Exchange) -> Vec<ExtractedFact> {
        let prompt = build_extraction_prompt(exchange);
        let reply = match self.generate(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(user_id = %exchange.user_id, error = %e, "extraction call failed");
                return Vec::new();
            }
        };
        match parse_extraction_response(&reply) {
            Ok(facts) => {
                tracing::debug!(user_id = %exchange.user_id, count = facts.len(), "facts extracted");
                facts
            }
            Err(e) => {
                tracing::warn!(user_id = %exchange.user_id, error = %e, "extraction reply rejected");
                Vec::new()
            }
        }
    }

    /// Per-key usage, for clients that rotate keys.
    fn key_status(&self) -> Vec<KeyStatus> {
        Vec::new()
    }
}
