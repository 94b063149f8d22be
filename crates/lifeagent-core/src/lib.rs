//! Core dispatch primitives for Life Agent.
//!
//! This crate owns the turn dispatcher, session handling, the agent runner
//! contract, and the history/snapshot collaborators used by the SDK.

pub mod error;
pub mod history;
pub mod runner;
pub mod snapshot;
pub mod types;

mod dispatcher;

pub use dispatcher::{Dispatcher, DispatcherBuilder, TurnStream};
pub use error::CoreError;
pub use history::{HistoryRecord, HistoryStore, JsonlHistoryStore};
/// Re-export for convenience.
pub use lifeagent_protocol::EventSink;
pub use runner::{AgentRunner, RunnerOutput};
pub use snapshot::{StateRecord, StateSnapshotProvider};
pub use types::{
    DEFAULT_SESSION_ID, Message, Role, Session, SessionKey, SessionSummary, TurnResult,
};
