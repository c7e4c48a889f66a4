//! CLI `chat` command: the interactive session.

use std::sync::Arc;

use anyhow::{Context, Result};

use kindred::chat::{repl, ChatSession};
use kindred::config::KindredConfig;
use kindred::db;
use kindred::llm::gemini::GeminiClient;

pub async fn chat(config: &KindredConfig, user: Option<String>) -> Result<()> {
    let user_id = user.unwrap_or_else(|| config.resolved_user_id());
    let conn = super::open_db(config)?;
    let client = GeminiClient::new(&config.api).context("cannot start chat")?;
    tracing::info!(user_id = %user_id, model = client.model(), "starting chat session");

    let session = ChatSession::new(
        user_id,
        db::share(conn),
        Arc::new(client),
        config.persona.clone(),
        config.memory.clone(),
    );
    repl::run(session).await
}
