// src/memory/types.rs
// Core data types for the conversational memory subsystem

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Filter key for memory operations: a user, optionally narrowed to one
/// conversation. User-wide scopes match records from every conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub user_id: String,
    pub conversation_id: Option<String>,
}

impl Scope {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: None,
        }
    }

    pub fn conversation(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: Some(conversation_id.into()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.conversation_id {
            Some(conv) => write!(f, "{}/{}", self.user_id, conv),
            None => write!(f, "{}", self.user_id),
        }
    }
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Capitalized form used when rendering context lines.
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(anyhow::anyhow!("unknown role: {}", s)),
        }
    }
}

/// A chunked, embedded unit stored in the vector index. One long message may
/// map to several records (overlapping chunks), so reconstruction of the
/// exact original text is not guaranteed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: u64,
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Similarity score when returned from a ranked query; absent on scroll.
    pub score: Option<f32>,
}

/// One half of a conversational turn, as handed to the store for chunking
/// and embedding.
#[derive(Debug, Clone)]
pub struct TurnMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl TurnMessage {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }
}
