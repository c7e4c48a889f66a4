#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use kindred::chat::ChatSession;
use kindred::config::{MemoryConfig, PersonaConfig};
use kindred::db::{self, SharedConnection};
use kindred::error::ChatError;
use kindred::llm::{CompletionClient, CompletionRequest, TextStream};
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

pub fn shared_db() -> SharedConnection {
    db::share(test_db())
}

/// What the next `complete` call should do.
pub enum StreamScript {
    /// Yield these chunks, then end.
    Chunks(Vec<&'static str>),
    /// Yield these chunks, then fail.
    FailAfter(Vec<&'static str>, ChatError),
    /// Fail before streaming starts.
    Reject(ChatError),
    /// Yield these chunks, then never finish.
    Hang(Vec<&'static str>),
}

/// Completion client that plays back scripted responses in order.
#[derive(Default)]
pub struct ScriptedClient {
    streams: Mutex<VecDeque<StreamScript>>,
    extractions: Mutex<VecDeque<Result<String, ChatError>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
    pub extraction_prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_stream(&self, script: StreamScript) {
        self.streams.lock().unwrap().push_back(script);
    }

    pub fn push_reply(&self, text: &'static str) {
        self.push_stream(StreamScript::Chunks(vec![text]));
    }

    pub fn push_extraction(&self, reply: &str) {
        self.extractions.lock().unwrap().push_back(Ok(reply.to_string()));
    }

    pub fn push_extraction_error(&self, err: ChatError) {
        self.extractions.lock().unwrap().push_back(Err(err));
    }

    pub fn last_request(&self) -> CompletionRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

fn ok_chunks(chunks: Vec<&'static str>) -> impl futures::Stream<Item = Result<String, ChatError>> {
    stream::iter(chunks.into_iter().map(|c| Ok(c.to_string())))
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<TextStream, ChatError> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StreamScript::Chunks(vec!["ok"]));
        match script {
            StreamScript::Chunks(chunks) => Ok(Box::pin(ok_chunks(chunks))),
            StreamScript::FailAfter(chunks, err) => {
                Ok(Box::pin(ok_chunks(chunks).chain(stream::iter([Err(err)]))))
            }
            StreamScript::Reject(err) => Err(err),
            StreamScript::Hang(chunks) => Ok(Box::pin(ok_chunks(chunks).chain(stream::pending()))),
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        self.extraction_prompts.lock().unwrap().push(prompt.to_string());
        self.extractions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(r#"{"memories": []}"#.to_string()))
    }
}

/// Memory settings for tests: inline extraction unless `background` is set.
pub fn memory_config(background: bool) -> MemoryConfig {
    MemoryConfig {
        background_extraction: background,
        ..MemoryConfig::default()
    }
}

pub fn session(
    user: &str,
    db: &SharedConnection,
    client: &Arc<ScriptedClient>,
    memory: MemoryConfig,
) -> ChatSession {
    let client: Arc<dyn CompletionClient> = client.clone();
    ChatSession::new(user, Arc::clone(db), client, PersonaConfig::default(), memory)
}

/// A cancellation future that never fires.
pub fn never() -> std::future::Pending<()> {
    std::future::pending()
}

/// Run one exchange with no cancellation, collecting streamed chunks.
pub async fn say(
    session: &mut ChatSession,
    input: &str,
) -> (Result<kindred::chat::ExchangeOutcome, ChatError>, String) {
    let mut streamed = String::new();
    let result = session
        .exchange(input, |chunk| streamed.push_str(chunk), never())
        .await;
    (result, streamed)
}
