//! Dispatcher integration tests with scripted runners.

use lifeagent_core::history::HistoryStore;
use lifeagent_core::runner::AgentRunner;
use lifeagent_core::snapshot::StateSnapshotProvider;
use lifeagent_core::{CoreError, Dispatcher, RunnerOutput, StateRecord};
use lifeagent_protocol::AgentKind;
use lifeagent_test_utils::{
    FailingHistory, FailingRunner, FailingSnapshots, MemoryHistoryStore, RecordingRunner,
    ScriptedRunner, StubSnapshots,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

struct Runners {
    manager: Arc<ScriptedRunner>,
    goal: Arc<ScriptedRunner>,
    state: Arc<ScriptedRunner>,
    task: Arc<ScriptedRunner>,
}

impl Runners {
    fn new(
        manager: Vec<RunnerOutput>,
        goal: Vec<RunnerOutput>,
        state: Vec<RunnerOutput>,
        task: Vec<RunnerOutput>,
    ) -> Self {
        Self {
            manager: Arc::new(ScriptedRunner::new(manager)),
            goal: Arc::new(ScriptedRunner::new(goal)),
            state: Arc::new(ScriptedRunner::new(state)),
            task: Arc::new(ScriptedRunner::new(task)),
        }
    }
}

fn dispatcher(runners: &Runners, history: Arc<dyn HistoryStore>) -> Dispatcher {
    dispatcher_with_snapshots(runners, history, Arc::new(StubSnapshots::default()))
}

fn dispatcher_with_snapshots(
    runners: &Runners,
    history: Arc<dyn HistoryStore>,
    snapshots: Arc<dyn StateSnapshotProvider>,
) -> Dispatcher {
    Dispatcher::builder()
        .history(history)
        .snapshots(snapshots)
        .runner(AgentKind::Manager, runners.manager.clone())
        .runner(AgentKind::Goal, runners.goal.clone())
        .runner(AgentKind::State, runners.state.clone())
        .runner(AgentKind::Task, runners.task.clone())
        .build()
        .expect("dispatcher")
}

/// Onboarding: the manager routes the first message to the goals
/// specialist, which keeps the conversation open.
#[tokio::test]
async fn manager_routes_first_contact_to_goal_specialist() {
    let runners = Runners::new(
        vec![RunnerOutput::new("").with_hand_off(AgentKind::Goal)],
        vec![RunnerOutput::new(
            "Hello! Let's start with your top life goals.",
        )],
        Vec::new(),
        Vec::new(),
    );
    let dispatcher = dispatcher(&runners, Arc::new(MemoryHistoryStore::new()));

    let result = dispatcher
        .run(1, "I want to get fit and save money", None)
        .await
        .expect("turn");

    assert_eq!(result.active_agent, AgentKind::Goal);
    assert_eq!(result.active_agent_label, "Life Goals");
    assert_eq!(result.response.is_empty(), false);
    assert_eq!(runners.manager.call_count(), 1);
    assert_eq!(runners.goal.call_count(), 1);
    assert_eq!(runners.state.call_count(), 0);
    assert_eq!(runners.task.call_count(), 0);
    assert_eq!(
        dispatcher.get_active_agent(1, None).await,
        Some(AgentKind::Goal)
    );
}

/// A manager turn with no handoff leaves the manager in charge.
#[tokio::test]
async fn manager_without_handoff_keeps_control() {
    let runners = Runners::new(
        vec![RunnerOutput::new("What would you like to work on?")],
        Vec::new(),
        Vec::new(),
        Vec::new(),
    );
    let dispatcher = dispatcher(&runners, Arc::new(MemoryHistoryStore::new()));

    let result = dispatcher.run(1, "hello", None).await.expect("turn");

    assert_eq!(result.active_agent, AgentKind::Manager);
    assert_eq!(dispatcher.get_active_agent(1, None).await, None);
    assert_eq!(runners.manager.call_count(), 1);
}

/// A specialist returning no handoff stays active across turns, and the
/// manager is not consulted again.
#[tokio::test]
async fn specialist_stays_active_without_handoff() {
    let runners = Runners::new(
        vec![RunnerOutput::new("").with_hand_off(AgentKind::Goal)],
        vec![
            RunnerOutput::new("What goals matter most to you?"),
            RunnerOutput::new("Got it, anything else?"),
        ],
        Vec::new(),
        Vec::new(),
    );
    let dispatcher = dispatcher(&runners, Arc::new(MemoryHistoryStore::new()));

    dispatcher.run(1, "hi", None).await.expect("first turn");
    let result = dispatcher
        .run(1, "getting fit, mostly", None)
        .await
        .expect("second turn");

    assert_eq!(result.active_agent, AgentKind::Goal);
    assert_eq!(runners.manager.call_count(), 1);
    assert_eq!(runners.goal.call_count(), 2);
    // Second goal call sees user, agent reply, then the new user message.
    assert_eq!(runners.goal.calls()[1].message_count, 3);
}

/// Self-handoff is a no-op: identical state to no handoff, no extra call.
#[tokio::test]
async fn self_handoff_is_equivalent_to_none() {
    let runners = Runners::new(
        vec![RunnerOutput::new("").with_hand_off(AgentKind::Goal)],
        vec![
            RunnerOutput::new("Let's talk goals."),
            RunnerOutput::new("Still on goals.").with_hand_off(AgentKind::Goal),
        ],
        Vec::new(),
        Vec::new(),
    );
    let dispatcher = dispatcher(&runners, Arc::new(MemoryHistoryStore::new()));

    dispatcher.run(1, "hi", None).await.expect("first turn");
    let result = dispatcher.run(1, "more", None).await.expect("second turn");

    assert_eq!(result.active_agent, AgentKind::Goal);
    assert_eq!(runners.goal.call_count(), 2);
    assert_eq!(runners.manager.call_count(), 1);
    assert_eq!(runners.state.call_count(), 0);
}

/// A finished specialist hands to the manager, whose follow-up routes the
/// next specialist; both contributions join the aggregate reply.
#[tokio::test]
async fn specialist_finish_triggers_manager_follow_up_routing() {
    let runners = Runners::new(
        vec![
            RunnerOutput::new("").with_hand_off(AgentKind::Goal),
            RunnerOutput::new("").with_hand_off(AgentKind::State),
        ],
        vec![
            RunnerOutput::new("What are your goals?"),
            RunnerOutput::new("Saved your goals.").with_hand_off(AgentKind::Manager),
        ],
        vec![RunnerOutput::new("How is your energy today?")],
        Vec::new(),
    );
    let dispatcher = dispatcher(&runners, Arc::new(MemoryHistoryStore::new()));

    dispatcher.run(1, "hi", None).await.expect("first turn");
    let result = dispatcher
        .run(1, "done for now", None)
        .await
        .expect("second turn");

    assert_eq!(result.active_agent, AgentKind::State);
    assert_eq!(
        result.response,
        "Saved your goals.\n\nHow is your energy today?".to_string()
    );
    assert_eq!(runners.manager.call_count(), 2);
    assert_eq!(runners.goal.call_count(), 2);
    assert_eq!(runners.state.call_count(), 1);
    assert_eq!(
        dispatcher.get_active_agent(1, None).await,
        Some(AgentKind::State)
    );
}

/// A finished specialist whose manager follow-up has nothing to route
/// leaves the manager in charge, with the manager's text appended.
#[tokio::test]
async fn manager_follow_up_without_routing_releases_control() {
    let runners = Runners::new(
        vec![
            RunnerOutput::new("").with_hand_off(AgentKind::Goal),
            RunnerOutput::new("All caught up. Anything else?"),
        ],
        vec![
            RunnerOutput::new("What are your goals?"),
            RunnerOutput::new("Goals saved.").with_hand_off(AgentKind::Manager),
        ],
        Vec::new(),
        Vec::new(),
    );
    let dispatcher = dispatcher(&runners, Arc::new(MemoryHistoryStore::new()));

    dispatcher.run(1, "hi", None).await.expect("first turn");
    let result = dispatcher.run(1, "done", None).await.expect("second turn");

    assert_eq!(result.active_agent, AgentKind::Manager);
    assert_eq!(
        result.response,
        "Goals saved.\n\nAll caught up. Anything else?".to_string()
    );
    assert_eq!(dispatcher.get_active_agent(1, None).await, None);
}

/// A specialist chains directly into another specialist within the turn.
#[tokio::test]
async fn specialist_chains_into_another_specialist() {
    let runners = Runners::new(
        vec![RunnerOutput::new("").with_hand_off(AgentKind::Goal)],
        vec![
            RunnerOutput::new("What are your goals?"),
            RunnerOutput::new("Goals captured.").with_hand_off(AgentKind::Task),
        ],
        Vec::new(),
        vec![RunnerOutput::new("Time to set up some tasks.")],
    );
    let dispatcher = dispatcher(&runners, Arc::new(MemoryHistoryStore::new()));

    dispatcher.run(1, "hi", None).await.expect("first turn");
    let result = dispatcher
        .run(1, "that's all my goals", None)
        .await
        .expect("second turn");

    assert_eq!(result.active_agent, AgentKind::Task);
    assert_eq!(
        result.response,
        "Goals captured.\n\nTime to set up some tasks.".to_string()
    );
    assert_eq!(runners.manager.call_count(), 1);
    assert_eq!(runners.task.call_count(), 1);
}

/// A chained specialist that immediately hands back to the manager releases
/// control instead of staying active.
#[tokio::test]
async fn chained_specialist_can_release_to_manager() {
    let runners = Runners::new(
        vec![RunnerOutput::new("").with_hand_off(AgentKind::Goal)],
        vec![
            RunnerOutput::new("What are your goals?"),
            RunnerOutput::new("Goals captured.").with_hand_off(AgentKind::Task),
        ],
        Vec::new(),
        vec![RunnerOutput::new("Nothing to do here.").with_hand_off(AgentKind::Manager)],
    );
    let dispatcher = dispatcher(&runners, Arc::new(MemoryHistoryStore::new()));

    dispatcher.run(1, "hi", None).await.expect("first turn");
    let result = dispatcher.run(1, "all done", None).await.expect("second turn");

    assert_eq!(result.active_agent, AgentKind::Manager);
    assert_eq!(dispatcher.get_active_agent(1, None).await, None);
}

/// Manager routing into a specialist that immediately forwards to a second
/// specialist stays within the single-hop cap: three invocations total.
#[tokio::test]
async fn manager_route_honors_single_hop_chain() {
    let runners = Runners::new(
        vec![RunnerOutput::new("").with_hand_off(AgentKind::Goal)],
        vec![RunnerOutput::new("Your goals are set already.").with_hand_off(AgentKind::State)],
        vec![RunnerOutput::new("Quick check-in: how did you sleep?")],
        Vec::new(),
    );
    let dispatcher = dispatcher(&runners, Arc::new(MemoryHistoryStore::new()));

    let result = dispatcher.run(1, "hello", None).await.expect("turn");

    assert_eq!(result.active_agent, AgentKind::State);
    assert_eq!(
        result.response,
        "Your goals are set already.\n\nQuick check-in: how did you sleep?".to_string()
    );
    assert_eq!(runners.manager.call_count(), 1);
    assert_eq!(runners.goal.call_count(), 1);
    assert_eq!(runners.state.call_count(), 1);
}

/// A routed specialist handing straight back to the manager ends the turn
/// with the manager in charge and no further invocation.
#[tokio::test]
async fn routed_specialist_returning_to_manager_ends_turn() {
    let runners = Runners::new(
        vec![RunnerOutput::new("").with_hand_off(AgentKind::Goal)],
        vec![RunnerOutput::new("Nothing new to collect.").with_hand_off(AgentKind::Manager)],
        Vec::new(),
        Vec::new(),
    );
    let dispatcher = dispatcher(&runners, Arc::new(MemoryHistoryStore::new()));

    let result = dispatcher.run(1, "hello", None).await.expect("turn");

    assert_eq!(result.active_agent, AgentKind::Manager);
    assert_eq!(runners.manager.call_count(), 1);
    assert_eq!(runners.goal.call_count(), 1);
}

/// A runner failure rolls the human message back out of the session, so a
/// retry sees the conversation exactly as before the failed send.
#[tokio::test]
async fn runner_failure_rolls_back_the_human_message() {
    let manager = Arc::new(ScriptedRunner::new(vec![
        RunnerOutput::new("").with_hand_off(AgentKind::Goal),
        RunnerOutput::new("Back with the manager."),
    ]));
    let goal: Arc<dyn AgentRunner> = Arc::new(FailingRunner::new("model unavailable"));
    let dispatcher = Dispatcher::builder()
        .history(Arc::new(MemoryHistoryStore::new()))
        .snapshots(Arc::new(StubSnapshots::default()))
        .runner(AgentKind::Manager, manager.clone())
        .runner(AgentKind::Goal, goal)
        .runner(AgentKind::State, Arc::new(ScriptedRunner::default()))
        .runner(AgentKind::Task, Arc::new(ScriptedRunner::default()))
        .build()
        .expect("dispatcher");

    let err = dispatcher
        .run(1, "please fail", None)
        .await
        .err()
        .expect("runner failure");
    match err {
        CoreError::Runner(message) => assert_eq!(message, "model unavailable".to_string()),
        other => panic!("unexpected error: {other:?}"),
    }

    // The failed human message is gone: the retry transcript starts fresh.
    dispatcher.run(1, "try again", None).await.expect("retry");
    let counts: Vec<usize> = manager
        .calls()
        .iter()
        .map(|call| call.message_count)
        .collect();
    assert_eq!(counts, vec![1, 1]);
    assert_eq!(dispatcher.get_active_agent(1, None).await, None);
}

/// Failed turns persist nothing; successful turns persist the human turn
/// plus the tagged agent turn.
#[tokio::test]
async fn history_mirrors_only_successful_turns() {
    let history = Arc::new(MemoryHistoryStore::new());
    let runners = Runners::new(
        vec![RunnerOutput::new("").with_hand_off(AgentKind::Goal)],
        vec![RunnerOutput::new("Let's define some goals.")],
        Vec::new(),
        Vec::new(),
    );
    let dispatcher = dispatcher(&runners, history.clone());

    dispatcher.run(4, "hello", None).await.expect("turn");

    let rows = history.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].1.role, "user".to_string());
    assert_eq!(rows[0].1.content, "hello".to_string());
    assert_eq!(rows[0].1.agent, None);
    assert_eq!(rows[1].1.role, "assistant".to_string());
    assert_eq!(rows[1].1.agent, Some(AgentKind::Goal));
    assert_eq!(rows[1].1.context_log.is_some(), true);
}

/// A history failure surfaces as an error without touching the runners'
/// view of the conversation.
#[tokio::test]
async fn history_failure_propagates() {
    let runners = Runners::new(
        vec![RunnerOutput::new("hi there")],
        Vec::new(),
        Vec::new(),
        Vec::new(),
    );
    let dispatcher = dispatcher(&runners, Arc::new(FailingHistory));

    let err = dispatcher.run(1, "hello", None).await.err().expect("failure");
    match err {
        CoreError::History(message) => {
            assert_eq!(message.contains("history unavailable"), true);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

/// The recent-state snapshot is fetched once per session, before the first
/// runner invocation, and survives across turns until reset.
#[tokio::test]
async fn snapshot_cache_warms_once_per_session() {
    let snapshots = Arc::new(StubSnapshots::new(vec![StateRecord {
        id: 1,
        created_at: chrono::Utc::now(),
        data: json!({ "energy": 7 }),
    }]));
    let runners = Runners::new(
        vec![
            RunnerOutput::new("first"),
            RunnerOutput::new("second"),
            RunnerOutput::new("third"),
        ],
        Vec::new(),
        Vec::new(),
        Vec::new(),
    );
    let dispatcher = dispatcher_with_snapshots(
        &runners,
        Arc::new(MemoryHistoryStore::new()),
        snapshots.clone(),
    );

    dispatcher.run(1, "one", None).await.expect("first turn");
    dispatcher.run(1, "two", None).await.expect("second turn");
    assert_eq!(snapshots.fetch_count(), 1);

    let calls = runners.manager.calls();
    assert_eq!(
        calls[0].cache_keys,
        vec!["recent_states".to_string()],
        "warm-up must land before the first invocation"
    );

    // Reset clears the cache, so the next turn warms it again.
    dispatcher.reset(1, None);
    dispatcher.run(1, "three", None).await.expect("third turn");
    assert_eq!(snapshots.fetch_count(), 2);
}

/// A snapshot fetch failure is soft: the turn still runs, just unhinted.
#[tokio::test]
async fn snapshot_failure_does_not_fail_the_turn() {
    let runners = Runners::new(
        vec![RunnerOutput::new("still here")],
        Vec::new(),
        Vec::new(),
        Vec::new(),
    );
    let dispatcher = dispatcher_with_snapshots(
        &runners,
        Arc::new(MemoryHistoryStore::new()),
        Arc::new(FailingSnapshots::new("db offline")),
    );

    let result = dispatcher.run(1, "hello", None).await.expect("turn");
    assert_eq!(result.response, "still here".to_string());
    assert_eq!(runners.manager.calls()[0].cache_keys.len(), 0);
}

/// Message growth per successful turn: one human entry plus at most one
/// aggregate agent entry, skipped when the reply is empty.
#[tokio::test]
async fn empty_reply_skips_the_agent_append() {
    let manager = Arc::new(RecordingRunner::new(RunnerOutput::new("")));
    let dispatcher = Dispatcher::builder()
        .history(Arc::new(MemoryHistoryStore::new()))
        .snapshots(Arc::new(StubSnapshots::default()))
        .runner(AgentKind::Manager, manager.clone())
        .runner(AgentKind::Goal, Arc::new(ScriptedRunner::default()))
        .runner(AgentKind::State, Arc::new(ScriptedRunner::default()))
        .runner(AgentKind::Task, Arc::new(ScriptedRunner::default()))
        .build()
        .expect("dispatcher");

    dispatcher.run(1, "first", None).await.expect("first turn");
    dispatcher.run(1, "second", None).await.expect("second turn");

    let transcript = manager.last_messages.lock().clone();
    let contents: Vec<&str> = transcript
        .iter()
        .map(|message| message.content.as_str())
        .collect();
    // No agent entries: both turns replied with empty text.
    assert_eq!(contents, vec!["first", "second"]);
}

/// Session listings come from durable history and hide the default session.
#[tokio::test]
async fn list_sessions_excludes_the_reserved_default() {
    let history = Arc::new(MemoryHistoryStore::new());
    let runners = Runners::new(
        vec![
            RunnerOutput::new("hello"),
            RunnerOutput::new("hello again"),
        ],
        Vec::new(),
        Vec::new(),
        Vec::new(),
    );
    let dispatcher = dispatcher(&runners, history);

    dispatcher.run(1, "hi", None).await.expect("default turn");
    dispatcher
        .run(1, "hi", Some("planning"))
        .await
        .expect("named turn");

    let sessions = dispatcher.list_sessions(1).expect("list");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, "planning".to_string());
    assert_eq!(sessions[0].message_count, 2);
}

/// Reset is idempotent and scoped to the named session.
#[tokio::test]
async fn reset_clears_session_state_idempotently() {
    let runners = Runners::new(
        vec![RunnerOutput::new("").with_hand_off(AgentKind::Goal)],
        vec![RunnerOutput::new("Goals time.")],
        Vec::new(),
        Vec::new(),
    );
    let dispatcher = dispatcher(&runners, Arc::new(MemoryHistoryStore::new()));

    dispatcher.run(1, "hi", None).await.expect("turn");
    assert_eq!(
        dispatcher.get_active_agent(1, None).await,
        Some(AgentKind::Goal)
    );

    dispatcher.reset(1, Some("default"));
    dispatcher.reset(1, Some("default"));
    assert_eq!(dispatcher.get_active_agent(1, None).await, None);
}
