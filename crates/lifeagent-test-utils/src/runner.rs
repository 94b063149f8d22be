use async_trait::async_trait;
use chrono::Utc;
use lifeagent_core::types::ContextCache;
use lifeagent_core::{AgentRunner, CoreError, Message, RunnerOutput};
use lifeagent_protocol::{AgentKind, EventMsg, EventPayload, EventSink};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

/// Snapshot of what one runner invocation observed.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedCall {
    pub user_id: i64,
    pub message_count: usize,
    pub cache_keys: Vec<String>,
}

/// Runner that serves queued outputs in order, recording each call.
///
/// When the queue runs dry it answers with an empty output and no handoff,
/// which keeps the current agent active.
#[derive(Default)]
pub struct ScriptedRunner {
    outputs: Mutex<VecDeque<RunnerOutput>>,
    calls: Arc<Mutex<Vec<ObservedCall>>>,
}

impl ScriptedRunner {
    pub fn new(outputs: Vec<RunnerOutput>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of invocations observed so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Everything observed, one entry per invocation.
    pub fn calls(&self) -> Vec<ObservedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AgentRunner for ScriptedRunner {
    async fn run(
        &self,
        user_id: i64,
        messages: &[Message],
        cache: &mut ContextCache,
        _events: Option<&dyn EventSink>,
    ) -> Result<RunnerOutput, CoreError> {
        let mut cache_keys: Vec<String> = cache.keys().cloned().collect();
        cache_keys.sort();
        self.calls.lock().push(ObservedCall {
            user_id,
            message_count: messages.len(),
            cache_keys,
        });
        Ok(self.outputs.lock().pop_front().unwrap_or_default())
    }
}

/// Runner with a fixed output that captures the full transcript it saw.
pub struct RecordingRunner {
    output: RunnerOutput,
    pub last_messages: Arc<Mutex<Vec<Message>>>,
}

impl RecordingRunner {
    pub fn new(output: RunnerOutput) -> Self {
        Self {
            output,
            last_messages: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl AgentRunner for RecordingRunner {
    async fn run(
        &self,
        _user_id: i64,
        messages: &[Message],
        _cache: &mut ContextCache,
        _events: Option<&dyn EventSink>,
    ) -> Result<RunnerOutput, CoreError> {
        *self.last_messages.lock() = messages.to_vec();
        Ok(self.output.clone())
    }
}

/// Runner that always fails.
pub struct FailingRunner {
    message: String,
}

impl FailingRunner {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl AgentRunner for FailingRunner {
    async fn run(
        &self,
        _user_id: i64,
        _messages: &[Message],
        _cache: &mut ContextCache,
        _events: Option<&dyn EventSink>,
    ) -> Result<RunnerOutput, CoreError> {
        Err(CoreError::Runner(self.message.clone()))
    }
}

/// Runner that emits a token event per chunk before answering with their
/// concatenation.
pub struct StreamingRunner {
    agent: AgentKind,
    chunks: Vec<String>,
    hand_off: Option<AgentKind>,
}

impl StreamingRunner {
    pub fn new(agent: AgentKind, chunks: Vec<String>) -> Self {
        Self {
            agent,
            chunks,
            hand_off: None,
        }
    }

    pub fn with_hand_off(mut self, target: AgentKind) -> Self {
        self.hand_off = Some(target);
        self
    }
}

#[async_trait]
impl AgentRunner for StreamingRunner {
    async fn run(
        &self,
        user_id: i64,
        _messages: &[Message],
        _cache: &mut ContextCache,
        events: Option<&dyn EventSink>,
    ) -> Result<RunnerOutput, CoreError> {
        if let Some(sink) = events {
            for chunk in &self.chunks {
                sink.emit(EventMsg {
                    id: Uuid::new_v4(),
                    user_id,
                    session_id: String::new(),
                    created_at: Utc::now(),
                    payload: EventPayload::Token {
                        agent: self.agent,
                        content: chunk.clone(),
                    },
                });
            }
        }
        let mut output = RunnerOutput::new(self.chunks.concat());
        output.hand_off = self.hand_off;
        Ok(output)
    }
}
