//! Turn execution and handoff routing.

use super::registry::AgentRegistry;
use super::sessions::SessionStore;
use crate::error::CoreError;
use crate::history::{HistoryRecord, HistoryStore};
use crate::runner::RunnerOutput;
use crate::snapshot::StateSnapshotProvider;
use crate::types::{
    CacheEntry, ContextCache, Message, RECENT_STATES_KEY, Role, Session, SessionKey, TurnResult,
};
use chrono::Utc;
use lifeagent_config::LifeagentConfig;
use lifeagent_protocol::{AgentKind, ContextLogEntry, EventMsg, EventPayload, EventSink, TurnId};
use log::{debug, error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

/// Parameters for a single turn execution.
pub(crate) struct TurnParams {
    pub(crate) key: SessionKey,
    pub(crate) input: String,
    pub(crate) turn_id: Option<TurnId>,
    pub(crate) event_sink: Option<Arc<dyn EventSink>>,
}

/// Routing outcome before it is written back into the session.
struct RoutedTurn {
    response: String,
    context_log: Vec<ContextLogEntry>,
    next_active: Option<AgentKind>,
}

/// Executes one turn: routing, chaining, rollback, and persistence.
pub(crate) struct TurnExecutor {
    /// Shared configuration snapshot.
    config: Arc<LifeagentConfig>,
    /// Session registry holding conversation state.
    sessions: SessionStore,
    /// Runner bindings for every agent kind.
    registry: AgentRegistry,
    /// Durable history mirror.
    history: Arc<dyn HistoryStore>,
    /// Recent-state collaborator for cache warm-up.
    snapshots: Arc<dyn StateSnapshotProvider>,
    /// Optional global event sink.
    event_sink: Option<Arc<dyn EventSink>>,
}

impl TurnExecutor {
    /// Create a new executor over the shared dispatcher state.
    pub(crate) fn new(
        config: Arc<LifeagentConfig>,
        sessions: SessionStore,
        registry: AgentRegistry,
        history: Arc<dyn HistoryStore>,
        snapshots: Arc<dyn StateSnapshotProvider>,
        event_sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        Self {
            config,
            sessions,
            registry,
            history,
            snapshots,
            event_sink,
        }
    }

    /// Execute a single turn end-to-end.
    ///
    /// Holds the session cell for the whole turn; a runner failure rolls
    /// back the just-appended human message and nothing is persisted.
    pub(crate) async fn run_turn(&self, params: TurnParams) -> Result<TurnResult, CoreError> {
        let TurnParams {
            key,
            input,
            turn_id,
            event_sink,
        } = params;
        let event_sink = event_sink.or_else(|| self.event_sink.clone());
        let turn_id = turn_id.unwrap_or_else(Uuid::new_v4);

        let cell = self.sessions.get_or_create(&key);
        let mut session = cell.lock().await;

        let active = session.active_agent.unwrap_or(AgentKind::Manager);
        info!(
            "starting turn (user={}, session={}, active={}, prompt_len={})",
            key.user_id,
            key.session_id,
            active,
            input.len()
        );

        session.messages.push(Message::user(input.as_str()));
        let appended_at = session.messages.len();

        self.warm_snapshot_cache(&key, &mut session).await;

        self.emit(
            &event_sink,
            &key,
            EventPayload::TurnStarted {
                turn_id,
                agent: active,
            },
        );

        let routed = match self.route(&key, active, &mut session, &event_sink).await {
            Ok(routed) => routed,
            Err(err) => {
                error!(
                    "turn failed (user={}, session={}, active={}): {}",
                    key.user_id, key.session_id, active, err
                );
                session.messages.truncate(appended_at - 1);
                self.emit(
                    &event_sink,
                    &key,
                    EventPayload::Error {
                        turn_id: Some(turn_id),
                        message: err.to_string(),
                    },
                );
                return Err(err);
            }
        };

        let RoutedTurn {
            response,
            context_log,
            next_active,
        } = routed;
        if !response.is_empty() {
            session.messages.push(Message::assistant(response.as_str()));
        }
        session.active_agent = next_active;
        let result_agent = next_active.unwrap_or(AgentKind::Manager);

        self.persist(&key, &input, &response, &context_log, result_agent)?;

        self.emit(
            &event_sink,
            &key,
            EventPayload::TurnCompleted {
                turn_id,
                response: response.clone(),
                active_agent: result_agent,
            },
        );
        info!(
            "completed turn (user={}, session={}, next={})",
            key.user_id, key.session_id, result_agent
        );

        Ok(TurnResult {
            response,
            context_log,
            active_agent: result_agent,
            active_agent_label: result_agent.label(),
        })
    }

    /// Populate the shared recent-state cache entry once per session.
    async fn warm_snapshot_cache(&self, key: &SessionKey, session: &mut Session) {
        if session.context_cache.contains_key(RECENT_STATES_KEY) {
            return;
        }
        let limit = self.config.snapshot.limit;
        match self.snapshots.fetch_recent(key.user_id, limit).await {
            Ok(states) => match serde_json::to_value(&states) {
                Ok(result) => {
                    debug!(
                        "warmed state snapshot (user={}, records={})",
                        key.user_id,
                        states.len()
                    );
                    session.context_cache.insert(
                        RECENT_STATES_KEY.to_string(),
                        CacheEntry {
                            result,
                            timestamp: Utc::now(),
                        },
                    );
                }
                Err(err) => warn!(
                    "state snapshot not serializable (user={}): {}",
                    key.user_id, err
                ),
            },
            // Never fatal: agents just run without the hint.
            Err(err) => warn!(
                "state snapshot fetch failed (user={}): {}",
                key.user_id, err
            ),
        }
    }

    /// Apply the routing rules, invoking up to three runners sequentially.
    async fn route(
        &self,
        key: &SessionKey,
        active: AgentKind,
        session: &mut Session,
        sink: &Option<Arc<dyn EventSink>>,
    ) -> Result<RoutedTurn, CoreError> {
        // Chained runners see prior contributions through this working
        // transcript; only the final aggregate reaches the session.
        let mut working = session.messages.clone();
        let cache = &mut session.context_cache;
        let mut parts: Vec<String> = Vec::new();
        let mut context_log: Vec<ContextLogEntry> = Vec::new();

        let first = self.invoke(key, active, &working, cache, sink).await?;
        debug!(
            "handoff (user={}, session={}, agent={}, target={:?})",
            key.user_id,
            key.session_id,
            active,
            first.hand_off.map(|kind| kind.as_str())
        );
        let first_hand_off = first.hand_off;
        push_contribution(&mut parts, &mut working, &first.response);
        context_log.extend(first.context_log);

        let next_active = if active == AgentKind::Manager {
            match first_hand_off {
                Some(target) if target.is_specialist() => {
                    info!(
                        "routing (user={}, session={}, target={})",
                        key.user_id, key.session_id, target
                    );
                    let second = self.invoke(key, target, &working, cache, sink).await?;
                    let second_hand_off = second.hand_off;
                    push_contribution(&mut parts, &mut working, &second.response);
                    context_log.extend(second.context_log);
                    match second_hand_off {
                        Some(AgentKind::Manager) => None,
                        Some(next) if next.is_specialist() && next != target => {
                            self.chain_into(
                                key,
                                next,
                                &mut working,
                                cache,
                                &mut parts,
                                &mut context_log,
                                sink,
                            )
                            .await?
                        }
                        // `None` and self-handoff both keep the specialist.
                        _ => Some(target),
                    }
                }
                // No handoff, or one that normalized back to the manager.
                _ => None,
            }
        } else {
            match first_hand_off {
                None => Some(active),
                Some(target) if target == active => Some(active),
                Some(AgentKind::Manager) => {
                    info!(
                        "specialist finished, manager follow-up (user={}, session={}, agent={})",
                        key.user_id, key.session_id, active
                    );
                    let follow_up = self
                        .invoke(key, AgentKind::Manager, &working, cache, sink)
                        .await?;
                    let follow_up_hand_off = follow_up.hand_off;
                    push_contribution(&mut parts, &mut working, &follow_up.response);
                    context_log.extend(follow_up.context_log);
                    match follow_up_hand_off {
                        Some(next) if next.is_specialist() => {
                            let third = self.invoke(key, next, &working, cache, sink).await?;
                            push_contribution(&mut parts, &mut working, &third.response);
                            context_log.extend(third.context_log);
                            // Single-hop cap: the third invocation's own
                            // signal is logged but never acted on.
                            Some(next)
                        }
                        _ => None,
                    }
                }
                Some(target) => {
                    self.chain_into(
                        key,
                        target,
                        &mut working,
                        cache,
                        &mut parts,
                        &mut context_log,
                        sink,
                    )
                    .await?
                }
            }
        };

        Ok(RoutedTurn {
            response: parts.join("\n\n"),
            context_log,
            next_active,
        })
    }

    /// Run a chained specialist and derive the next active agent from its
    /// signal: a manager handoff releases control, anything else keeps the
    /// chained specialist active.
    #[allow(clippy::too_many_arguments)]
    async fn chain_into(
        &self,
        key: &SessionKey,
        target: AgentKind,
        working: &mut Vec<Message>,
        cache: &mut ContextCache,
        parts: &mut Vec<String>,
        context_log: &mut Vec<ContextLogEntry>,
        sink: &Option<Arc<dyn EventSink>>,
    ) -> Result<Option<AgentKind>, CoreError> {
        info!(
            "chaining (user={}, session={}, target={})",
            key.user_id, key.session_id, target
        );
        let output = self.invoke(key, target, working, cache, sink).await?;
        let hand_off = output.hand_off;
        push_contribution(parts, working, &output.response);
        context_log.extend(output.context_log);
        Ok(match hand_off {
            Some(AgentKind::Manager) => None,
            _ => Some(target),
        })
    }

    /// Invoke one runner, announcing it on the event stream first.
    async fn invoke(
        &self,
        key: &SessionKey,
        kind: AgentKind,
        messages: &[Message],
        cache: &mut ContextCache,
        sink: &Option<Arc<dyn EventSink>>,
    ) -> Result<RunnerOutput, CoreError> {
        let runner = self.registry.get(kind)?;
        self.emit(
            sink,
            key,
            EventPayload::AgentStarted {
                agent: kind,
                label: kind.label().to_string(),
            },
        );
        debug!(
            "invoking runner (user={}, session={}, agent={})",
            key.user_id, key.session_id, kind
        );
        runner.run(key.user_id, messages, cache, sink.as_deref()).await
    }

    /// Mirror both halves of the turn into durable history.
    fn persist(
        &self,
        key: &SessionKey,
        input: &str,
        response: &str,
        context_log: &[ContextLogEntry],
        agent: AgentKind,
    ) -> Result<(), CoreError> {
        let user_record = HistoryRecord {
            session_id: key.session_id.clone(),
            role: Role::User.as_str().to_string(),
            content: input.to_string(),
            context_log: None,
            agent: None,
            created_at: Utc::now(),
        };
        self.history
            .append(key.user_id, &user_record)
            .map_err(|err| CoreError::History(err.to_string()))?;

        let agent_record = HistoryRecord {
            session_id: key.session_id.clone(),
            role: Role::Assistant.as_str().to_string(),
            content: response.to_string(),
            context_log: Some(context_log.to_vec()),
            agent: Some(agent),
            created_at: Utc::now(),
        };
        self.history
            .append(key.user_id, &agent_record)
            .map_err(|err| CoreError::History(err.to_string()))
    }

    /// Emit a turn-scoped event if an event sink is configured.
    fn emit(&self, sink: &Option<Arc<dyn EventSink>>, key: &SessionKey, payload: EventPayload) {
        let Some(sink) = sink else {
            return;
        };
        sink.emit(EventMsg {
            id: Uuid::new_v4(),
            user_id: key.user_id,
            session_id: key.session_id.clone(),
            created_at: Utc::now(),
            payload,
        });
    }
}

/// Record a non-empty contribution in the aggregate and working transcript.
fn push_contribution(parts: &mut Vec<String>, working: &mut Vec<Message>, response: &str) {
    if response.is_empty() {
        return;
    }
    parts.push(response.to_string());
    working.push(Message::assistant(response));
}

#[cfg(test)]
mod tests {
    use super::push_contribution;
    use crate::types::Role;
    use pretty_assertions::assert_eq;

    #[test]
    fn push_contribution_skips_empty_responses() {
        let mut parts = Vec::new();
        let mut working = Vec::new();

        push_contribution(&mut parts, &mut working, "");
        assert_eq!(parts.len(), 0);
        assert_eq!(working.len(), 0);

        push_contribution(&mut parts, &mut working, "here are your goals");
        push_contribution(&mut parts, &mut working, "and a check-in question");
        assert_eq!(parts.join("\n\n").contains("\n\n"), true);
        assert_eq!(working.len(), 2);
        assert_eq!(working[1].role, Role::Assistant);
    }
}
