//! Fact extraction: the instruction sent to the model and the decoder for its reply.
//!
//! The decoder is two-stage. The envelope (`{"memories": [...]}`) must be valid
//! or the whole reply is rejected; after that each element is decoded on its
//! own and a bad element is skipped without touching the rest.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{Exchange, ExtractedFact, FactCategory};
use crate::error::ChatError;

const DEFAULT_IMPORTANCE: u8 = 5;

/// Instruction for the extraction call. `{user_message}` and `{ai_response}`
/// are substituted by [`build_extraction_prompt`].
pub const EXTRACTION_PROMPT: &str = r#"Analyze this conversation and extract important information that should be remembered for future conversations. Extract information about BOTH the user AND what the AI (you) said.

User said: "{user_message}"
AI responded: "{ai_response}"

Extract information in this JSON format (return ONLY the JSON, nothing else):
{
  "memories": [
    {"key": "user_name", "value": "John", "importance": 10, "about": "user"},
    {"key": "user_favorite_color", "value": "blue", "importance": 5, "about": "user"},
    {"key": "ai_recommended_book", "value": "recommended 'Clean Code' for learning", "importance": 5, "about": "conversation"}
  ]
}

Rules:
1. About the user ("about": "user"): name, age, location, job, hobbies, preferences,
   family, pets, important dates. Prefix keys with "user_".
2. About the conversation ("about": "conversation"): what the AI explained, taught,
   recommended, or solved, with brief context of when and why. Prefix keys with "ai_".
3. Keys are lowercase with underscores. Importance is 1-10 (10 = critical like a
   name, 5-7 = useful context, 1-3 = minor).
4. Skip greetings, politeness, temporary states, and generic replies.
   If nothing is worth remembering, return {"memories": []}.

Return the JSON now:"#;

/// Fill [`EXTRACTION_PROMPT`] with one exchange.
pub fn build_extraction_prompt(exchange: &Exchange) -> String {
    fill_placeholders(
        EXTRACTION_PROMPT,
        &[
            ("{user_message}", &exchange.input),
            ("{ai_response}", &exchange.response),
        ],
    )
}

/// Substitute placeholders in one left-to-right pass; inserted text is never rescanned.
fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let next = values
            .iter()
            .filter_map(|(name, value)| rest.find(name).map(|at| (at, *name, *value)))
            .min_by_key(|(at, _, _)| *at);
        let Some((at, name, value)) = next else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..at]);
        out.push_str(value);
        rest = &rest[at + name.len()..];
    }
}

#[derive(Deserialize)]
struct Envelope {
    memories: Vec<Value>,
}

#[derive(Deserialize)]
struct RawFact {
    key: String,
    value: String,
    #[serde(default)]
    importance: Option<Value>,
    #[serde(default)]
    about: Option<String>,
}

/// Decode the model's reply into validated facts.
///
/// Returns `MalformedResponse` if the reply is not a `{"memories": [...]}`
/// object. Individual elements that fail validation are logged and dropped.
pub fn parse_extraction_response(response: &str) -> Result<Vec<ExtractedFact>, ChatError> {
    let json = strip_code_fence(response);
    let envelope: Envelope = serde_json::from_str(json).map_err(|e| {
        debug!(raw = %response, "unparsable extraction reply");
        ChatError::MalformedResponse(format!("extraction envelope: {e}"))
    })?;

    let mut facts = Vec::with_capacity(envelope.memories.len());
    for (index, element) in envelope.memories.into_iter().enumerate() {
        match decode_fact(element) {
            Ok(fact) => facts.push(fact),
            Err(reason) => warn!(index, %reason, "skipping extracted fact"),
        }
    }
    Ok(facts)
}

fn decode_fact(element: Value) -> Result<ExtractedFact, String> {
    let raw: RawFact = serde_json::from_value(element).map_err(|e| e.to_string())?;

    let key = normalize_key(&raw.key);
    if key.is_empty() {
        return Err(format!("empty key {:?}", raw.key));
    }
    let value = raw.value.trim();
    if value.is_empty() {
        return Err(format!("empty value for {key}"));
    }

    let category = match raw.about.as_deref().map(str::trim) {
        None | Some("") => FactCategory::User,
        Some(about) => about.to_ascii_lowercase().parse()?,
    };

    let importance = match raw.importance {
        None | Some(Value::Null) => DEFAULT_IMPORTANCE,
        Some(v) => parse_importance(&v).ok_or_else(|| format!("bad importance {v} for {key}"))?,
    };

    Ok(ExtractedFact {
        category,
        key,
        value: value.to_string(),
        importance,
    })
}

/// Integers, floats (rounded), and numeric strings, clamped to 1..=10.
fn parse_importance(v: &Value) -> Option<u8> {
    let n = match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    Some(n.clamp(1, 10) as u8)
}

/// Lowercase snake case: runs of anything that is not alphanumeric become one `_`.
pub fn normalize_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let inner = if let Some((_, rest)) = trimmed.split_once("```json") {
        rest
    } else if let Some((_, rest)) = trimmed.split_once("```") {
        rest
    } else {
        return trimmed;
    };
    inner.split("```").next().unwrap_or(inner).trim()
}
