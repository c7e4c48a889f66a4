//! Core record types.
//!
//! Defines [`FactCategory`], [`MemoryFact`], [`ConversationTurn`] with its
//! [`TurnStatus`], [`Preferences`] with [`RelationshipLevel`], and the
//! [`ExtractedFact`] tuple produced by the extractor.

use serde::{Deserialize, Serialize};

/// Row id of a stored conversation turn.
pub type TurnId = i64;
/// Row id of a stored memory fact.
pub type FactId = i64;

/// What a fact is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    /// Something about the user: name, job, hobbies, preferences.
    User,
    /// Something the assistant said or did: explanations, recommendations.
    Conversation,
}

impl FactCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Conversation => "conversation",
        }
    }
}

impl std::fmt::Display for FactCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FactCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "conversation" => Ok(Self::Conversation),
            _ => Err(format!("unknown fact category: {s}")),
        }
    }
}

/// A learned fact, matching the `ai_memory` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFact {
    pub id: FactId,
    pub user_id: String,
    pub category: FactCategory,
    pub key: String,
    pub value: String,
    /// 1 (minor) to 10 (critical, e.g. the user's name).
    pub importance: u8,
    pub created_at: String,
    pub updated_at: String,
    pub last_accessed: Option<String>,
    pub access_count: u32,
}

/// Whether an exchange ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Complete,
    /// Cancelled mid-stream; `response` holds whatever arrived.
    Incomplete,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Incomplete => "incomplete",
        }
    }
}

impl std::str::FromStr for TurnStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complete" => Ok(Self::Complete),
            "incomplete" => Ok(Self::Incomplete),
            _ => Err(format!("unknown turn status: {s}")),
        }
    }
}

/// One stored exchange, matching the `conversations` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub user_id: String,
    pub input: String,
    pub response: String,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    /// Free-form tags such as `relationship_level`.
    pub context: serde_json::Value,
    pub status: TurnStatus,
}

/// A turn that has not been written yet.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub user_id: String,
    pub input: String,
    pub response: String,
    pub context: serde_json::Value,
    pub status: TurnStatus,
}

/// One fact as returned by the extraction model, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFact {
    pub category: FactCategory,
    pub key: String,
    pub value: String,
    pub importance: u8,
}

/// The user/assistant pair handed to the extractor.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub user_id: String,
    pub input: String,
    pub response: String,
}

/// Relationship stage derived from the interaction count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipLevel {
    Stranger,
    Acquaintance,
    Friend,
    CloseFriend,
}

impl RelationshipLevel {
    pub fn from_interactions(interactions: u32) -> Self {
        match interactions {
            n if n >= 50 => Self::CloseFriend,
            n if n >= 20 => Self::Friend,
            n if n >= 5 => Self::Acquaintance,
            _ => Self::Stranger,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stranger => "stranger",
            Self::Acquaintance => "acquaintance",
            Self::Friend => "friend",
            Self::CloseFriend => "close_friend",
        }
    }
}

impl std::fmt::Display for RelationshipLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationshipLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stranger" => Ok(Self::Stranger),
            "acquaintance" => Ok(Self::Acquaintance),
            "friend" => Ok(Self::Friend),
            "close_friend" => Ok(Self::CloseFriend),
            _ => Err(format!("unknown relationship level: {s}")),
        }
    }
}

/// Per-user scalar state, matching `user_preferences`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preferences {
    pub user_id: String,
    /// Recent turns recalled before each exchange. `0` means all of them.
    pub memory_window: u32,
    pub interactions: u32,
    pub relationship_level: RelationshipLevel,
}
