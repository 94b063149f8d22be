//! Wire protocol types shared across the Life Agent dispatcher crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a turn.
pub type TurnId = Uuid;
/// Unique identifier for an emitted event.
pub type EventId = Uuid;

/// Closed set of agent kinds known to the dispatcher.
///
/// The manager routes and synthesizes; each specialist owns one focused
/// multi-turn interview. Wire tokens are the lowercase variant names and
/// never change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Routing/synthesis agent; handles any session with no active specialist.
    Manager,
    /// Life goals interview specialist.
    Goal,
    /// Physical/mental state check-in specialist.
    State,
    /// Task management specialist.
    Task,
}

/// Every agent kind, manager first.
pub const ALL_AGENTS: [AgentKind; 4] = [
    AgentKind::Manager,
    AgentKind::Goal,
    AgentKind::State,
    AgentKind::Task,
];

/// The specialist subset: every kind except the manager.
pub const SPECIALISTS: [AgentKind; 3] = [AgentKind::Goal, AgentKind::State, AgentKind::Task];

impl AgentKind {
    /// Return the stable wire token for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Manager => "manager",
            AgentKind::Goal => "goal",
            AgentKind::State => "state",
            AgentKind::Task => "task",
        }
    }

    /// Human-facing label shown alongside responses and events.
    pub fn label(&self) -> &'static str {
        match self {
            AgentKind::Manager => "Manager",
            AgentKind::Goal => "Life Goals",
            AgentKind::State => "State Check-In",
            AgentKind::Task => "Tasks",
        }
    }

    /// Whether this kind belongs to the specialist subset.
    pub fn is_specialist(&self) -> bool {
        !matches!(self, AgentKind::Manager)
    }

    /// Normalize a wire token to a kind.
    ///
    /// Tokens are trimmed of surrounding whitespace and matched exactly
    /// against the canonical lowercase names; anything unrecognized falls
    /// back to the manager. No fuzzy matching.
    pub fn normalize(token: &str) -> Self {
        match token.trim() {
            "manager" => AgentKind::Manager,
            "goal" => AgentKind::Goal,
            "state" => AgentKind::State,
            "task" => AgentKind::Task,
            _ => AgentKind::Manager,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record in a turn's context log.
///
/// Logs from every agent invoked in a turn are concatenated in invocation
/// order and mirrored into durable history alongside the agent reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextLogEntry {
    /// System prompt presented to an agent.
    System { content: String, agent: AgentKind },
    /// Plain conversational message seen or produced by an agent.
    Message {
        role: String,
        content: String,
        agent: AgentKind,
    },
    /// Tool invocation made by an agent.
    ToolCall {
        name: String,
        args: Value,
        result: String,
        agent: AgentKind,
    },
}

/// Wrapper for events emitted while a turn executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMsg {
    /// Unique id for the event.
    pub id: EventId,
    /// User the turn belongs to.
    pub user_id: i64,
    /// Session the turn belongs to.
    pub session_id: String,
    /// Timestamp when the event was created.
    pub created_at: DateTime<Utc>,
    /// Event payload content.
    pub payload: EventPayload,
}

/// All events emitted during turn execution.
///
/// Turn-scoped events carry the turn id; agent-scoped events are emitted by
/// runners mid-flight and identify only the agent producing them. Exactly
/// one terminal event (`TurnCompleted` or `Error`) closes each turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum EventPayload {
    /// Turn execution started with the given agent in control.
    TurnStarted { turn_id: TurnId, agent: AgentKind },
    /// An agent invocation began.
    AgentStarted { agent: AgentKind, label: String },
    /// Streaming response token from an agent.
    Token { agent: AgentKind, content: String },
    /// Tool execution started inside an agent.
    ToolStarted { agent: AgentKind, tool: String },
    /// Tool execution finished inside an agent.
    ToolFinished { agent: AgentKind, tool: String },
    /// Turn finished; the aggregate reply and the next handler.
    TurnCompleted {
        turn_id: TurnId,
        response: String,
        active_agent: AgentKind,
    },
    /// Turn failed; the conversation is as if the message was never sent.
    Error {
        turn_id: Option<TurnId>,
        message: String,
    },
}

/// Sink interface for turn lifecycle events.
pub trait EventSink: Send + Sync {
    /// Emit an event to downstream listeners.
    fn emit(&self, event: EventMsg);
}
