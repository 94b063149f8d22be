//! Agent runner contract consumed by the dispatcher.

use crate::error::CoreError;
use crate::types::{ContextCache, Message};
use async_trait::async_trait;
use lifeagent_protocol::{AgentKind, ContextLogEntry, EventSink};

/// Output of one agent invocation.
#[derive(Debug, Clone, Default)]
pub struct RunnerOutput {
    /// Final user-facing text, possibly empty.
    pub response: String,
    /// Interaction log accumulated during the invocation.
    pub context_log: Vec<ContextLogEntry>,
    /// Routing signal: `Some(Manager)` returns control upward, a specialist
    /// requests a chain, `None` keeps the same agent active.
    pub hand_off: Option<AgentKind>,
}

impl RunnerOutput {
    /// Build an output with a response and no handoff.
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            context_log: Vec::new(),
            hand_off: None,
        }
    }

    /// Attach a handoff target to the output.
    pub fn with_hand_off(mut self, target: AgentKind) -> Self {
        self.hand_off = Some(target);
        self
    }

    /// Attach a context log to the output.
    pub fn with_context_log(mut self, context_log: Vec<ContextLogEntry>) -> Self {
        self.context_log = context_log;
        self
    }
}

/// One conversational agent as the dispatcher sees it.
///
/// Implementations own the LLM call and tool loop behind this seam. The
/// contract they must hold:
///
/// - `messages` is the causal conversation in order; implementations append
///   any working messages to their own copy, never to the caller's slice.
/// - Cache reads and writes are advisory; the dispatcher does not validate
///   entry shapes.
/// - Events are emitted only while the call is in flight; none after return.
/// - Runs terminate: internal tool loops are bounded (`runner.max_iterations`
///   in config) and exhaustion still yields a best-effort response.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Execute one agent invocation over the conversation so far.
    async fn run(
        &self,
        user_id: i64,
        messages: &[Message],
        cache: &mut ContextCache,
        events: Option<&dyn EventSink>,
    ) -> Result<RunnerOutput, CoreError>;
}
