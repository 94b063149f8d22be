//! Dispatcher core: routing facade, session lifecycle, event streaming.

mod registry;
mod routing;
mod sessions;

use crate::error::CoreError;
use crate::history::HistoryStore;
use crate::runner::AgentRunner;
use crate::snapshot::StateSnapshotProvider;
use crate::types::{SessionKey, SessionSummary, TurnResult};
use lifeagent_config::LifeagentConfig;
use lifeagent_protocol::{AgentKind, EventMsg, EventSink, TurnId};
use log::{debug, info};
use registry::AgentRegistry;
use routing::{TurnExecutor, TurnParams};
use sessions::SessionStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

/// Streaming handle for a single dispatched turn.
pub struct TurnStream {
    /// Turn id associated with the streamed events.
    pub turn_id: TurnId,
    /// Stream of events emitted while the turn executes.
    pub events: BroadcastStream<EventMsg>,
    handle: JoinHandle<Result<TurnResult, CoreError>>,
}

impl TurnStream {
    /// Await completion of the turn and return the final result.
    pub async fn finish(self) -> Result<TurnResult, CoreError> {
        self.handle
            .await
            .map_err(|err| CoreError::Runner(err.to_string()))?
    }
}

/// Per-run event bus bridging the turn task to stream consumers.
#[derive(Clone)]
struct RunEventBus {
    sender: broadcast::Sender<EventMsg>,
}

impl RunEventBus {
    fn new(buffer: usize) -> (Self, broadcast::Receiver<EventMsg>) {
        let (sender, receiver) = broadcast::channel(buffer);
        (Self { sender }, receiver)
    }
}

impl EventSink for RunEventBus {
    fn emit(&self, event: EventMsg) {
        let _ = self.sender.send(event);
    }
}

/// Fans events out to a per-run bus and an optional global sink.
struct FanoutEventSink {
    primary: Option<Arc<dyn EventSink>>,
    secondary: Arc<dyn EventSink>,
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: EventMsg) {
        if let Some(primary) = &self.primary {
            primary.emit(event.clone());
        }
        self.secondary.emit(event);
    }
}

/// Main dispatch facade: owns sessions, runner bindings, and turn execution.
pub struct Dispatcher {
    config: Arc<LifeagentConfig>,
    sessions: SessionStore,
    history: Arc<dyn HistoryStore>,
    executor: Arc<TurnExecutor>,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl Dispatcher {
    /// Start building a dispatcher.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Return the shared configuration for this dispatcher.
    pub fn config(&self) -> &LifeagentConfig {
        &self.config
    }

    /// Handle to the durable history collaborator, for read surfaces.
    pub fn history(&self) -> Arc<dyn HistoryStore> {
        self.history.clone()
    }

    /// Run one blocking turn for a user message.
    pub async fn run(
        &self,
        user_id: i64,
        message: impl Into<String>,
        session_id: Option<&str>,
    ) -> Result<TurnResult, CoreError> {
        let key = self.key(user_id, session_id);
        self.executor
            .run_turn(TurnParams {
                key,
                input: message.into(),
                turn_id: None,
                event_sink: None,
            })
            .await
    }

    /// Run one turn on a spawned task and stream its events.
    pub fn run_stream(
        &self,
        user_id: i64,
        message: impl Into<String>,
        session_id: Option<&str>,
    ) -> TurnStream {
        let key = self.key(user_id, session_id);
        let input = message.into();
        let turn_id = Uuid::new_v4();
        info!(
            "streaming turn (user={}, session={}, prompt_len={})",
            key.user_id,
            key.session_id,
            input.len()
        );
        let (run_bus, receiver) = RunEventBus::new(self.config.dispatcher.stream_buffer);
        let fanout: Arc<dyn EventSink> = Arc::new(FanoutEventSink {
            primary: self.event_sink.clone(),
            secondary: Arc::new(run_bus),
        });
        let executor = self.executor.clone();
        let handle = tokio::spawn(async move {
            executor
                .run_turn(TurnParams {
                    key,
                    input,
                    turn_id: Some(turn_id),
                    event_sink: Some(fanout),
                })
                .await
        });

        TurnStream {
            turn_id,
            events: BroadcastStream::new(receiver),
            handle,
        }
    }

    /// Clear in-memory state for one session, or all of a user's sessions.
    pub fn reset(&self, user_id: i64, session_id: Option<&str>) {
        self.sessions.reset(user_id, session_id);
    }

    /// Specialist owning the next turn for a session, if any.
    pub async fn get_active_agent(
        &self,
        user_id: i64,
        session_id: Option<&str>,
    ) -> Option<AgentKind> {
        let key = self.key(user_id, session_id);
        self.sessions.active_agent(&key).await
    }

    /// List stored sessions for a user, excluding the reserved default one.
    pub fn list_sessions(&self, user_id: i64) -> Result<Vec<SessionSummary>, CoreError> {
        let summaries = self
            .history
            .summarize_sessions(user_id)
            .map_err(|err| CoreError::History(err.to_string()))?;
        Ok(summaries
            .into_iter()
            .filter(|summary| summary.session_id != self.config.dispatcher.default_session_id)
            .map(SessionSummary::from)
            .collect())
    }

    /// Resolve a caller-supplied session id against the configured default.
    fn key(&self, user_id: i64, session_id: Option<&str>) -> SessionKey {
        let session_id = session_id.unwrap_or(&self.config.dispatcher.default_session_id);
        SessionKey::new(user_id, session_id)
    }
}

/// Builder wiring config, collaborators, and the four agent runners.
pub struct DispatcherBuilder {
    config: LifeagentConfig,
    history: Option<Arc<dyn HistoryStore>>,
    snapshots: Option<Arc<dyn StateSnapshotProvider>>,
    event_sink: Option<Arc<dyn EventSink>>,
    runners: HashMap<AgentKind, Arc<dyn AgentRunner>>,
}

impl DispatcherBuilder {
    fn new() -> Self {
        Self {
            config: LifeagentConfig::default(),
            history: None,
            snapshots: None,
            event_sink: None,
            runners: HashMap::new(),
        }
    }

    /// Replace the default configuration.
    pub fn config(mut self, config: LifeagentConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the durable history collaborator.
    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Set the recent-state snapshot collaborator.
    pub fn snapshots(mut self, snapshots: Arc<dyn StateSnapshotProvider>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Set a global sink receiving every turn's events.
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Bind a runner to an agent kind. All four kinds are required.
    pub fn runner(mut self, kind: AgentKind, runner: Arc<dyn AgentRunner>) -> Self {
        debug!("binding runner (agent={})", kind);
        self.runners.insert(kind, runner);
        self
    }

    /// Validate the wiring and build the dispatcher.
    pub fn build(self) -> Result<Dispatcher, CoreError> {
        let history = self
            .history
            .ok_or_else(|| CoreError::Builder("history store is required".to_string()))?;
        let snapshots = self
            .snapshots
            .ok_or_else(|| CoreError::Builder("snapshot provider is required".to_string()))?;
        let registry = AgentRegistry::new(self.runners)?;
        let config = Arc::new(self.config);
        let sessions = SessionStore::new();
        let executor = Arc::new(TurnExecutor::new(
            config.clone(),
            sessions.clone(),
            registry,
            history.clone(),
            snapshots,
            self.event_sink.clone(),
        ));
        info!("dispatcher initialized");
        Ok(Dispatcher {
            config,
            sessions,
            history,
            executor,
            event_sink: self.event_sink,
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Dispatcher, RunEventBus};
    use crate::error::CoreError;
    use crate::history::{HistoryError, HistoryRecord, HistoryStore, SessionSummaryRecord};
    use crate::snapshot::{SnapshotError, StateRecord, StateSnapshotProvider};
    use async_trait::async_trait;
    use lifeagent_protocol::{AgentKind, EventMsg, EventPayload, EventSink};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct NullHistory;

    impl HistoryStore for NullHistory {
        fn append(&self, _user_id: i64, _record: &HistoryRecord) -> Result<(), HistoryError> {
            Ok(())
        }

        fn list(
            &self,
            _user_id: i64,
            _session_id: Option<&str>,
        ) -> Result<Vec<HistoryRecord>, HistoryError> {
            Ok(Vec::new())
        }

        fn summarize_sessions(
            &self,
            _user_id: i64,
        ) -> Result<Vec<SessionSummaryRecord>, HistoryError> {
            Ok(Vec::new())
        }

        fn delete(&self, _user_id: i64, _session_id: Option<&str>) -> Result<bool, HistoryError> {
            Ok(false)
        }
    }

    struct NullSnapshots;

    #[async_trait]
    impl StateSnapshotProvider for NullSnapshots {
        async fn fetch_recent(
            &self,
            _user_id: i64,
            _limit: usize,
        ) -> Result<Vec<StateRecord>, SnapshotError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn builder_rejects_missing_collaborators() {
        let err = Dispatcher::builder().build().err().expect("missing history");
        match err {
            CoreError::Builder(message) => {
                assert_eq!(message.contains("history"), true);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = Dispatcher::builder()
            .history(Arc::new(NullHistory))
            .snapshots(Arc::new(NullSnapshots))
            .build()
            .err()
            .expect("missing runners");
        match err {
            CoreError::MissingRunner(kind) => assert_eq!(kind, AgentKind::Manager),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_event_bus_drops_events_without_subscribers() {
        let (bus, receiver) = RunEventBus::new(8);
        drop(receiver);
        // Send failures are intentionally ignored.
        bus.emit(EventMsg {
            id: uuid::Uuid::new_v4(),
            user_id: 1,
            session_id: "default".to_string(),
            created_at: chrono::Utc::now(),
            payload: EventPayload::Error {
                turn_id: None,
                message: "ignored".to_string(),
            },
        });
    }
}
