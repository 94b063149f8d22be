//! Error types for the core dispatcher crate.

use lifeagent_protocol::AgentKind;
use thiserror::Error;

/// Errors returned by dispatcher operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Agent runner failed while executing a turn.
    #[error("runner error: {0}")]
    Runner(String),
    /// Durable history append or read failed.
    #[error("history error: {0}")]
    History(String),
    /// Recent-state snapshot fetch failed.
    #[error("snapshot error: {0}")]
    Snapshot(String),
    /// No runner bound for an agent kind.
    #[error("no runner registered for agent: {0}")]
    MissingRunner(AgentKind),
    /// Dispatcher construction failed.
    #[error("builder error: {0}")]
    Builder(String),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
