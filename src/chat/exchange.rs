//! One user's conversation session: recall, generate, persist, extract.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use tracing::{debug, error, info};

use super::worker::{self, ExtractionWorker};
use crate::config::{MemoryConfig, PersonaConfig};
use crate::db::{self, SharedConnection};
use crate::error::ChatError;
use crate::llm::{CompletionClient, CompletionRequest, HistoryMessage, Role};
use crate::memory::context::{assemble_context, ContextBudget};
use crate::memory::preferences;
use crate::memory::store;
use crate::memory::types::{
    ConversationTurn, Exchange, NewTurn, RelationshipLevel, TurnId, TurnStatus,
};

/// Where an exchange currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    Idle,
    Recalling,
    Generating,
    Persisting,
    Extracting,
}

/// How an exchange ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Completed { turn_id: TurnId, response: String },
    /// Cancelled mid-stream; the partial response was stored as incomplete.
    Cancelled { turn_id: TurnId, partial: String },
}

impl ExchangeOutcome {
    pub fn turn_id(&self) -> TurnId {
        match self {
            Self::Completed { turn_id, .. } | Self::Cancelled { turn_id, .. } => *turn_id,
        }
    }
}

pub struct ChatSession {
    user_id: String,
    db: SharedConnection,
    client: Arc<dyn CompletionClient>,
    persona: PersonaConfig,
    memory: MemoryConfig,
    phase: ExchangePhase,
    worker: Option<ExtractionWorker>,
}

impl ChatSession {
    /// Create a session. Must be called inside a tokio runtime when background
    /// extraction is enabled, since it spawns the worker.
    pub fn new(
        user_id: impl Into<String>,
        db: SharedConnection,
        client: Arc<dyn CompletionClient>,
        persona: PersonaConfig,
        memory: MemoryConfig,
    ) -> Self {
        let worker = (memory.auto_extract && memory.background_extraction)
            .then(|| ExtractionWorker::spawn(Arc::clone(&client), Arc::clone(&db)));
        Self {
            user_id: user_id.into(),
            db,
            client,
            persona,
            memory,
            phase: ExchangePhase::Idle,
            worker,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    pub fn db(&self) -> &SharedConnection {
        &self.db
    }

    pub fn client(&self) -> &dyn CompletionClient {
        self.client.as_ref()
    }

    pub fn persona_name(&self) -> &str {
        &self.persona.name
    }

    pub fn memory_config(&self) -> &MemoryConfig {
        &self.memory
    }

    fn enter(&mut self, phase: ExchangePhase) {
        debug!(user_id = %self.user_id, from = ?self.phase, to = ?phase, "exchange phase");
        self.phase = phase;
    }

    /// Run one exchange.
    ///
    /// Chunks are handed to `sink` as they arrive. If `cancel` resolves first,
    /// the partial response is stored as an incomplete turn and no extraction
    /// runs. A remote error aborts the exchange without storing anything.
    pub async fn exchange<S, C>(
        &mut self,
        input: &str,
        mut sink: S,
        cancel: C,
    ) -> Result<ExchangeOutcome, ChatError>
    where
        S: FnMut(&str),
        C: Future<Output = ()>,
    {
        self.enter(ExchangePhase::Recalling);
        let (relationship, request) = match self.recall(input).await {
            Ok(r) => r,
            Err(e) => {
                self.enter(ExchangePhase::Idle);
                return Err(e);
            }
        };

        self.enter(ExchangePhase::Generating);
        let (response, cancelled) = match self.generate(request, &mut sink, cancel).await {
            Ok(r) => r,
            Err(e) => {
                error!(user_id = %self.user_id, error = %e, "generation failed");
                self.enter(ExchangePhase::Idle);
                return Err(e);
            }
        };

        self.enter(ExchangePhase::Persisting);
        let status = if cancelled {
            TurnStatus::Incomplete
        } else {
            TurnStatus::Complete
        };
        let turn = NewTurn {
            user_id: self.user_id.clone(),
            input: input.to_string(),
            response: response.clone(),
            context: json!({ "relationship_level": relationship.as_str(), "command": "chat" }),
            status,
        };
        let turn_id = match db::call(&self.db, move |conn| store::append_turn(conn, &turn)).await {
            Ok(id) => id,
            Err(e) => {
                self.enter(ExchangePhase::Idle);
                return Err(e);
            }
        };
        info!(user_id = %self.user_id, turn_id, status = status.as_str(), "exchange stored");

        if cancelled {
            self.enter(ExchangePhase::Idle);
            return Ok(ExchangeOutcome::Cancelled {
                turn_id,
                partial: response,
            });
        }

        if self.memory.auto_extract {
            self.enter(ExchangePhase::Extracting);
            let exchange = Exchange {
                user_id: self.user_id.clone(),
                input: input.to_string(),
                response: response.clone(),
            };
            match &self.worker {
                Some(worker) => worker.submit(exchange),
                None => {
                    worker::extract_and_store(self.client.as_ref(), &self.db, exchange).await;
                }
            }
        }

        self.enter(ExchangePhase::Idle);
        Ok(ExchangeOutcome::Completed { turn_id, response })
    }

    /// Load preferences, facts, and recent turns, and build the request.
    async fn recall(
        &self,
        input: &str,
    ) -> Result<(RelationshipLevel, CompletionRequest), ChatError> {
        let user_id = self.user_id.clone();
        let default_window = self.memory.default_window;
        let (prefs, facts, turns) = db::call(&self.db, move |conn| {
            let prefs = preferences::record_interaction(conn, &user_id, default_window)?;
            let facts = store::list_facts(conn, &user_id, None)?;
            let turns = store::recent_turns(conn, &user_id, prefs.memory_window)?;
            Ok((prefs, facts, turns))
        })
        .await?;
        debug!(
            user_id = %self.user_id,
            facts = facts.len(),
            turns = turns.len(),
            window = prefs.memory_window,
            "recalled"
        );

        let budget = ContextBudget {
            max_chars: self.memory.context_budget_chars,
            snippet_chars: self.memory.snippet_chars,
        };
        let context = assemble_context(&facts, &turns, &budget);
        let request = CompletionRequest {
            persona: self.persona.instructions.clone(),
            history: history_messages(&turns, self.memory.history_turns),
            prompt: build_prompt(input, &context, prefs.relationship_level),
        };
        Ok((prefs.relationship_level, request))
    }

    /// Stream the response into `sink`. Returns the text and whether it was cancelled.
    async fn generate<S, C>(
        &self,
        request: CompletionRequest,
        sink: &mut S,
        cancel: C,
    ) -> Result<(String, bool), ChatError>
    where
        S: FnMut(&str),
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        let mut stream = tokio::select! {
            biased;
            _ = &mut cancel => return Ok((String::new(), true)),
            stream = self.client.complete(request) => stream?,
        };

        let mut response = String::new();
        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => return Ok((response, true)),
                chunk = stream.next() => match chunk {
                    Some(Ok(text)) => {
                        sink(&text);
                        response.push_str(&text);
                    }
                    Some(Err(e)) => return Err(e),
                    None => break,
                },
            }
        }

        if response.trim().is_empty() {
            return Err(ChatError::MalformedResponse("empty response".into()));
        }
        Ok((response, false))
    }

    /// Flush pending extractions and stop the worker.
    pub async fn shutdown(mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown().await;
        }
        info!(user_id = %self.user_id, "session closed");
    }
}

/// The last `n` complete turns as alternating user/model messages, oldest first.
fn history_messages(turns: &[ConversationTurn], n: usize) -> Vec<HistoryMessage> {
    let recent: Vec<_> = turns
        .iter()
        .filter(|t| t.status == TurnStatus::Complete)
        .take(n)
        .collect();
    recent
        .into_iter()
        .rev()
        .flat_map(|t| {
            [
                HistoryMessage {
                    role: Role::User,
                    text: t.input.clone(),
                },
                HistoryMessage {
                    role: Role::Model,
                    text: t.response.clone(),
                },
            ]
        })
        .collect()
}

fn build_prompt(input: &str, context: &str, relationship: RelationshipLevel) -> String {
    let mut prompt = format!("The user asked: \"{input}\"\n");
    if !context.is_empty() {
        prompt.push('\n');
        prompt.push_str(context);
    }
    prompt.push_str(&format!(
        "\nYour relationship with this user: {relationship}.\n\
         Please answer the user's question. Keep your response under 1800 characters."
    ));
    prompt
}
