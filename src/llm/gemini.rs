//! HTTP client for the Gemini `generateContent` API.
//!
//! Handles key rotation through [`KeyPool`], retry with exponential backoff on
//! transient failures, and SSE streaming for `streamGenerateContent`.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::keys::{Exhausted, KeyPool, KeyStatus};
use super::{CompletionClient, CompletionRequest, TextStream};
use crate::config::ApiConfig;
use crate::error::ChatError;

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    keys: Mutex<KeyPool>,
    max_attempts: u32,
    backoff: Duration,
    timeout: Duration,
}

impl GeminiClient {
    /// Build a client from `[api]` config. Fails with `Config` when no key is set.
    pub fn new(config: &ApiConfig) -> Result<Self, ChatError> {
        if config.api_keys.is_empty() {
            return Err(ChatError::Config(
                "no Gemini API key found; set GEMINI_API_KEY or [api].api_keys".into(),
            ));
        }
        let timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(model = %config.model, keys = config.api_keys.len(), "Gemini client ready");
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            keys: Mutex::new(KeyPool::new(
                config.api_keys.clone(),
                config.rate_limit_per_key,
                Instant::now(),
            )),
            max_attempts: config.max_retries.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn keys(&self) -> MutexGuard<'_, KeyPool> {
        // Pool state stays consistent even if a holder panicked.
        self.keys.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    /// POST `body` to `method`, retrying transient failures on rotated keys.
    ///
    /// Each key that failed counts one error for the whole request, however
    /// many attempts it served.
    async fn send(
        &self,
        method: &str,
        body: &Value,
        streaming: bool,
    ) -> Result<reqwest::Response, ChatError> {
        let url = self.endpoint(method);
        let mut last_error = None;
        let mut failed_keys: Vec<usize> = Vec::new();

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = self.backoff * 2u32.saturating_pow(attempt - 1);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying Gemini request");
                tokio::time::sleep(delay).await;
                self.keys().rotate();
            }

            let acquired = self.keys().acquire(Instant::now());
            let (idx, key) = match acquired {
                Ok(picked) => picked,
                Err(Exhausted::RateLimited) => {
                    return Err(ChatError::Quota(
                        "all API keys are rate limited or cooling down".into(),
                    ))
                }
                Err(Exhausted::Failing) => {
                    return Err(last_error.unwrap_or_else(|| {
                        ChatError::RemoteService("all API keys are cooling down after errors".into())
                    }))
                }
            };

            let mut builder = self.http.post(&url).header("x-goog-api-key", key).json(body);
            if !streaming {
                builder = builder.timeout(self.timeout);
            }

            let err = match builder.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(status = %response.status(), attempt, key = idx + 1, "Gemini response received");
                    self.keys().record_success(idx);
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status();
                    debug!(status = %status, attempt, key = idx + 1, "Gemini response received");
                    let text = response.text().await.unwrap_or_default();
                    let err = classify_failure(status, &text);
                    if matches!(err, ChatError::Quota(_)) {
                        self.keys().record_quota(idx, Instant::now());
                        return Err(err);
                    }
                    if !status.is_server_error() {
                        self.keys().record_error(idx, Instant::now());
                        return Err(err);
                    }
                    err
                }
                Err(e) => ChatError::RemoteService(format!("request failed: {e}")),
            };

            warn!(key = idx + 1, error = %err, "transient Gemini error");
            if !failed_keys.contains(&idx) {
                failed_keys.push(idx);
            }
            last_error = Some(err);
        }

        {
            let now = Instant::now();
            let mut keys = self.keys();
            for idx in failed_keys {
                keys.record_error(idx, now);
            }
        }
        Err(last_error
            .unwrap_or_else(|| ChatError::RemoteService("request failed after retries".into())))
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<TextStream, ChatError> {
        let body = request_body(&request);
        let response = self
            .send("streamGenerateContent?alt=sse", &body, true)
            .await?;
        Ok(parse_sse_stream(response))
    }

    async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
        });
        let response = self.send("generateContent", &body, false).await?;
        let text = response
            .text()
            .await
            .map_err(|e| ChatError::RemoteService(format!("failed to read response body: {e}")))?;
        let parsed: GenerateResponse = serde_json::from_str(&text)?;
        let reply = parsed.into_text()?;
        if reply.trim().is_empty() {
            return Err(ChatError::MalformedResponse("response contained no text".into()));
        }
        Ok(reply)
    }

    fn key_status(&self) -> Vec<KeyStatus> {
        self.keys().status(Instant::now())
    }
}

fn request_body(request: &CompletionRequest) -> Value {
    let mut contents: Vec<Value> = request
        .history
        .iter()
        .map(|m| json!({"role": m.role, "parts": [{"text": m.text}]}))
        .collect();
    contents.push(json!({"role": "user", "parts": [{"text": request.prompt}]}));

    let mut body = json!({ "contents": contents });
    if !request.persona.is_empty() {
        body["systemInstruction"] = json!({"parts": [{"text": request.persona}]});
    }
    body
}

/// Map a non-success status and body onto the error taxonomy.
fn classify_failure(status: StatusCode, body: &str) -> ChatError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    let lower = body.to_ascii_lowercase();
    if status == StatusCode::TOO_MANY_REQUESTS
        || lower.contains("quota")
        || lower.contains("resource_exhausted")
    {
        ChatError::Quota(format!("{status}: {message}"))
    } else {
        ChatError::RemoteService(format!("{status}: {message}"))
    }
}

/// Turn an SSE response body into text chunks, skipping chunks with no text.
fn parse_sse_stream(response: reqwest::Response) -> TextStream {
    let stream = response
        .bytes_stream()
        .eventsource()
        .filter_map(|result| async move {
            match result {
                Ok(event) => {
                    if event.data.trim().is_empty() {
                        return None;
                    }
                    let chunk = match serde_json::from_str::<GenerateResponse>(&event.data) {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            return Some(Err(ChatError::MalformedResponse(format!(
                                "undecodable stream chunk: {e}"
                            ))))
                        }
                    };
                    match chunk.into_text() {
                        Ok(text) if text.is_empty() => None,
                        other => Some(other),
                    }
                }
                Err(e) => Some(Err(ChatError::RemoteService(format!("stream interrupted: {e}")))),
            }
        });
    Box::pin(stream)
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    fn into_text(self) -> Result<String, ChatError> {
        if let Some(err) = self.error {
            let status = err.status.unwrap_or_default();
            return Err(if status == "RESOURCE_EXHAUSTED" {
                ChatError::Quota(err.message)
            } else {
                ChatError::RemoteService(err.message)
            });
        }
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ChatError::MalformedResponse(format!("prompt blocked: {reason}")));
        }
        Ok(self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default())
    }
}
