//! Durable conversation history as append-only JSONL rollouts.

use chrono::{DateTime, Utc};
use lifeagent_protocol::{AgentKind, ContextLogEntry};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One stored history row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    /// Session the row belongs to.
    pub session_id: String,
    /// Role name ("user" or "assistant").
    pub role: String,
    /// Message content.
    pub content: String,
    /// Interaction log for agent rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_log: Option<Vec<ContextLogEntry>>,
    /// Agent that handled the turn, for agent rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentKind>,
    /// Timestamp for the row.
    pub created_at: DateTime<Utc>,
}

/// Summary derived from one session rollout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummaryRecord {
    /// Session token.
    pub session_id: String,
    /// Timestamp of the first stored row.
    pub started: DateTime<Utc>,
    /// Timestamp of the most recent stored row.
    pub last_message: DateTime<Utc>,
    /// Count of stored rows.
    pub message_count: usize,
}

/// Durable store abstraction for conversation history.
pub trait HistoryStore: Send + Sync {
    /// Append one history row for a user.
    fn append(&self, user_id: i64, record: &HistoryRecord) -> Result<(), HistoryError>;
    /// List rows for a user, oldest first, optionally scoped to one session.
    fn list(
        &self,
        user_id: i64,
        session_id: Option<&str>,
    ) -> Result<Vec<HistoryRecord>, HistoryError>;
    /// Summarize stored sessions for a user, most recently active first.
    fn summarize_sessions(&self, user_id: i64) -> Result<Vec<SessionSummaryRecord>, HistoryError>;
    /// Delete stored history for one session, or all of a user's sessions.
    fn delete(&self, user_id: i64, session_id: Option<&str>) -> Result<bool, HistoryError>;
}

/// Errors returned by the history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported schema version: {0}")]
    UnsupportedSchema(u32),
    #[error("missing session metadata")]
    MissingMetadata,
}

/// Internal JSONL event representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RolloutEvent {
    SchemaVersion {
        version: u32,
    },
    SessionStarted {
        user_id: i64,
        session_id: String,
        started_at: DateTime<Utc>,
    },
    Message {
        role: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context_log: Option<Vec<ContextLogEntry>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<AgentKind>,
        created_at: DateTime<Utc>,
    },
}

/// Replay state while reading a rollout file.
#[derive(Default)]
struct RolloutState {
    version: Option<u32>,
    session_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    records: Vec<HistoryRecord>,
}

impl RolloutState {
    fn apply(&mut self, event: RolloutEvent) -> Result<(), HistoryError> {
        match event {
            RolloutEvent::SchemaVersion { version } => {
                self.version = Some(version);
                if version > 1 {
                    return Err(HistoryError::UnsupportedSchema(version));
                }
            }
            RolloutEvent::SessionStarted {
                session_id,
                started_at,
                ..
            } => {
                self.session_id = Some(session_id);
                self.started_at = Some(started_at);
            }
            RolloutEvent::Message {
                role,
                content,
                context_log,
                agent,
                created_at,
            } => {
                let session_id = self.session_id.clone().unwrap_or_default();
                self.records.push(HistoryRecord {
                    session_id,
                    role,
                    content,
                    context_log,
                    agent,
                    created_at,
                });
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<SessionRollout, HistoryError> {
        let _ = self.version.ok_or(HistoryError::MissingMetadata)?;
        let session_id = self.session_id.ok_or(HistoryError::MissingMetadata)?;
        let started_at = self.started_at.ok_or(HistoryError::MissingMetadata)?;
        Ok(SessionRollout {
            session_id,
            started_at,
            records: self.records,
        })
    }
}

/// Fully replayed rollout for one session.
struct SessionRollout {
    session_id: String,
    started_at: DateTime<Utc>,
    records: Vec<HistoryRecord>,
}

impl SessionRollout {
    fn summary(&self) -> SessionSummaryRecord {
        let last_message = self
            .records
            .last()
            .map(|record| record.created_at)
            .unwrap_or(self.started_at);
        SessionSummaryRecord {
            session_id: self.session_id.clone(),
            started: self.started_at,
            last_message,
            message_count: self.records.len(),
        }
    }
}

/// JSONL-backed history store, one rollout file per (user, session).
pub struct JsonlHistoryStore {
    /// Root directory for rollouts, one subdirectory per user.
    root: PathBuf,
    /// Serialize write access to rollout files.
    write_lock: Mutex<()>,
}

impl JsonlHistoryStore {
    /// Create a new JSONL store under the given root.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("initialized JSONL history store (root={})", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding one user's rollouts.
    fn user_dir(&self, user_id: i64) -> PathBuf {
        self.root.join(format!("user-{user_id}"))
    }

    /// Rollout file path for a session.
    fn rollout_path(&self, user_id: i64, session_id: &str) -> PathBuf {
        self.user_dir(user_id)
            .join(format!("{}.jsonl", sanitize(session_id)))
    }

    /// Append a message event, creating the rollout on first contact.
    fn write_message(
        &self,
        user_id: i64,
        session_id: &str,
        event: &RolloutEvent,
        created_at: DateTime<Utc>,
    ) -> Result<(), HistoryError> {
        let _guard = self.write_lock.lock();
        let path = self.rollout_path(user_id, session_id);
        if !path.exists() {
            fs::create_dir_all(self.user_dir(user_id))?;
            let mut file = OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&path)?;
            let header = serde_json::to_string(&RolloutEvent::SchemaVersion { version: 1 })?;
            writeln!(file, "{header}")?;
            let started = serde_json::to_string(&RolloutEvent::SessionStarted {
                user_id,
                session_id: session_id.to_string(),
                started_at: created_at,
            })?;
            writeln!(file, "{started}")?;
        }
        let mut file = OpenOptions::new().append(true).open(&path)?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read and replay one rollout file.
    fn read_rollout(&self, path: &Path) -> Result<Option<SessionRollout>, HistoryError> {
        if !path.exists() {
            return Ok(None);
        }
        let file = OpenOptions::new().read(true).open(path)?;
        let reader = BufReader::new(file);
        let mut rollout = RolloutState::default();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event: RolloutEvent = serde_json::from_str(&line)?;
            rollout.apply(event)?;
        }
        Ok(Some(rollout.finish()?))
    }

    /// Replay every rollout belonging to a user.
    fn scan_user(&self, user_id: i64) -> Result<Vec<SessionRollout>, HistoryError> {
        let dir = self.user_dir(user_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut rollouts = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
                continue;
            }
            if let Some(rollout) = self.read_rollout(&path)? {
                rollouts.push(rollout);
            }
        }
        Ok(rollouts)
    }
}

impl HistoryStore for JsonlHistoryStore {
    /// Append one row as a rollout message event.
    fn append(&self, user_id: i64, record: &HistoryRecord) -> Result<(), HistoryError> {
        debug!(
            "appending history row (user={}, session={}, role={}, content_len={})",
            user_id,
            record.session_id,
            record.role,
            record.content.len()
        );
        let event = RolloutEvent::Message {
            role: record.role.clone(),
            content: record.content.clone(),
            context_log: record.context_log.clone(),
            agent: record.agent,
            created_at: record.created_at,
        };
        self.write_message(user_id, &record.session_id, &event, record.created_at)
    }

    /// List rows for a user, merged and ordered by timestamp.
    fn list(
        &self,
        user_id: i64,
        session_id: Option<&str>,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        if let Some(session_id) = session_id {
            let path = self.rollout_path(user_id, session_id);
            return Ok(self
                .read_rollout(&path)?
                .map(|rollout| rollout.records)
                .unwrap_or_default());
        }

        let mut records: Vec<HistoryRecord> = self
            .scan_user(user_id)?
            .into_iter()
            .flat_map(|rollout| rollout.records)
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Summarize sessions by scanning rollouts.
    fn summarize_sessions(&self, user_id: i64) -> Result<Vec<SessionSummaryRecord>, HistoryError> {
        let mut summaries: Vec<SessionSummaryRecord> = self
            .scan_user(user_id)?
            .iter()
            .map(SessionRollout::summary)
            .collect();
        summaries.sort_by(|a, b| b.last_message.cmp(&a.last_message));
        Ok(summaries)
    }

    /// Delete one session's rollout, or a user's whole directory.
    fn delete(&self, user_id: i64, session_id: Option<&str>) -> Result<bool, HistoryError> {
        let _guard = self.write_lock.lock();
        match session_id {
            Some(session_id) => {
                let path = self.rollout_path(user_id, session_id);
                if path.exists() {
                    info!(
                        "deleting history rollout (user={}, session={})",
                        user_id, session_id
                    );
                    fs::remove_file(path)?;
                    Ok(true)
                } else {
                    warn!(
                        "history rollout not found (user={}, session={})",
                        user_id, session_id
                    );
                    Ok(false)
                }
            }
            None => {
                let dir = self.user_dir(user_id);
                if dir.exists() {
                    info!("deleting all history rollouts (user={})", user_id);
                    fs::remove_dir_all(dir)?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
}

/// Session ids are client-chosen; keep rollout file names tame.
fn sanitize(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
