//! Core data types shared across the dispatcher API.

use chrono::{DateTime, Utc};
use lifeagent_protocol::{AgentKind, ContextLogEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Reserved session identifier used when a caller does not name one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Cache key for the per-session recent-state snapshot.
pub const RECENT_STATES_KEY: &str = "recent_states";

/// Key identifying one conversation: a user plus an opaque session token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Owning user.
    pub user_id: i64,
    /// Opaque client-chosen session token.
    pub session_id: String,
}

impl SessionKey {
    /// Build a key for a user and session token.
    pub fn new(user_id: i64, session_id: impl Into<String>) -> Self {
        Self {
            user_id,
            session_id: session_id.into(),
        }
    }
}

/// Message stored in a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role that produced the message.
    pub role: Role,
    /// Message content.
    pub content: String,
    /// Timestamp for the message.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a user-authored message stamped now.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Build an assistant-authored message stamped now.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Speaker role for a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User-authored message.
    User,
    /// Assistant-authored message.
    Assistant,
}

impl Role {
    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse a role from a lowercase string, defaulting to user.
    pub fn parse(value: &str) -> Self {
        if value == "assistant" {
            Role::Assistant
        } else {
            Role::User
        }
    }
}

/// One cached read-tool result shared across agents within a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    /// Opaque serialized tool result.
    pub result: Value,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
}

/// Per-session map of recent read-only tool results, keyed by tool name.
pub type ContextCache = HashMap<String, CacheEntry>;

/// Mutable conversation state for one (user, session) key.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Ordered conversation transcript.
    pub messages: Vec<Message>,
    /// Specialist owning the next turn; `None` leaves it with the manager.
    pub active_agent: Option<AgentKind>,
    /// Shared tool-result cache, cleared only by reset.
    pub context_cache: ContextCache,
}

/// Result of one dispatched turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    /// Aggregate reply from every agent that contributed text.
    pub response: String,
    /// Concatenated interaction logs in invocation order.
    pub context_log: Vec<ContextLogEntry>,
    /// Agent that will handle the next turn.
    pub active_agent: AgentKind,
    /// Human-facing label for `active_agent`.
    pub active_agent_label: &'static str,
}

/// Summary view of a stored session for listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    /// Opaque session token.
    pub session_id: String,
    /// Timestamp of the first stored message.
    pub started: DateTime<Utc>,
    /// Timestamp of the most recent stored message.
    pub last_message: DateTime<Utc>,
    /// Count of stored messages.
    pub message_count: usize,
}

impl From<crate::history::SessionSummaryRecord> for SessionSummary {
    fn from(record: crate::history::SessionSummaryRecord) -> Self {
        Self {
            session_id: record.session_id,
            started: record.started,
            last_message: record.last_message,
            message_count: record.message_count,
        }
    }
}
