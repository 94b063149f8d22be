use lifeagent_core::history::{HistoryError, HistoryRecord, HistoryStore, SessionSummaryRecord};
use parking_lot::Mutex;

/// In-memory history store for tests.
#[derive(Default)]
pub struct MemoryHistoryStore {
    rows: Mutex<Vec<(i64, HistoryRecord)>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored row in append order.
    pub fn rows(&self) -> Vec<(i64, HistoryRecord)> {
        self.rows.lock().clone()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(&self, user_id: i64, record: &HistoryRecord) -> Result<(), HistoryError> {
        self.rows.lock().push((user_id, record.clone()));
        Ok(())
    }

    fn list(
        &self,
        user_id: i64,
        session_id: Option<&str>,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|(row_user, record)| {
                *row_user == user_id
                    && session_id.is_none_or(|session_id| record.session_id == session_id)
            })
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn summarize_sessions(&self, user_id: i64) -> Result<Vec<SessionSummaryRecord>, HistoryError> {
        let rows = self.rows.lock();
        let mut summaries: Vec<SessionSummaryRecord> = Vec::new();
        for (row_user, record) in rows.iter() {
            if *row_user != user_id {
                continue;
            }
            match summaries
                .iter_mut()
                .find(|summary| summary.session_id == record.session_id)
            {
                Some(summary) => {
                    summary.last_message = record.created_at;
                    summary.message_count += 1;
                }
                None => summaries.push(SessionSummaryRecord {
                    session_id: record.session_id.clone(),
                    started: record.created_at,
                    last_message: record.created_at,
                    message_count: 1,
                }),
            }
        }
        summaries.sort_by(|a, b| b.last_message.cmp(&a.last_message));
        Ok(summaries)
    }

    fn delete(&self, user_id: i64, session_id: Option<&str>) -> Result<bool, HistoryError> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|(row_user, record)| {
            *row_user != user_id
                || session_id.is_some_and(|session_id| record.session_id != session_id)
        });
        Ok(rows.len() != before)
    }
}

/// History store that always fails.
#[derive(Default)]
pub struct FailingHistory;

impl FailingHistory {
    fn err() -> HistoryError {
        HistoryError::Io(std::io::Error::other("history unavailable"))
    }
}

impl HistoryStore for FailingHistory {
    fn append(&self, _user_id: i64, _record: &HistoryRecord) -> Result<(), HistoryError> {
        Err(Self::err())
    }

    fn list(
        &self,
        _user_id: i64,
        _session_id: Option<&str>,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        Err(Self::err())
    }

    fn summarize_sessions(
        &self,
        _user_id: i64,
    ) -> Result<Vec<SessionSummaryRecord>, HistoryError> {
        Err(Self::err())
    }

    fn delete(&self, _user_id: i64, _session_id: Option<&str>) -> Result<bool, HistoryError> {
        Err(Self::err())
    }
}
