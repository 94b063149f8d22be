//! In-memory session registry keyed by user and session id.

use crate::types::{Session, SessionKey};
use lifeagent_protocol::AgentKind;
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared session registry used by the dispatcher.
///
/// Each key owns an async mutex cell. The routing engine holds a cell for
/// the whole turn, which keeps same-key turns strictly sequential while
/// distinct keys run concurrently.
#[derive(Clone, Default)]
pub(crate) struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionKey, Arc<Mutex<Session>>>>>,
}

impl SessionStore {
    /// Create an empty store.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fetch the cell for a key, creating an empty session on first contact.
    pub(crate) fn get_or_create(&self, key: &SessionKey) -> Arc<Mutex<Session>> {
        if let Some(cell) = self.sessions.read().get(key) {
            return cell.clone();
        }
        let mut sessions = self.sessions.write();
        sessions
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(
                    "creating session (user={}, session={})",
                    key.user_id, key.session_id
                );
                Arc::new(Mutex::new(Session::default()))
            })
            .clone()
    }

    /// Drop one session, or every session belonging to a user. Idempotent.
    pub(crate) fn reset(&self, user_id: i64, session_id: Option<&str>) {
        let mut sessions = self.sessions.write();
        match session_id {
            Some(session_id) => {
                sessions.remove(&SessionKey::new(user_id, session_id));
            }
            None => sessions.retain(|key, _| key.user_id != user_id),
        }
        info!("session(s) reset (user={})", user_id);
    }

    /// Read the active specialist for a key, if the session exists.
    pub(crate) async fn active_agent(&self, key: &SessionKey) -> Option<AgentKind> {
        let cell = self.sessions.read().get(key).cloned()?;
        let session = cell.lock().await;
        session.active_agent
    }
}
