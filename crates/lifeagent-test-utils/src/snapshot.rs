use async_trait::async_trait;
use lifeagent_core::snapshot::{SnapshotError, StateRecord, StateSnapshotProvider};
use parking_lot::Mutex;
use std::sync::Arc;

/// Snapshot provider serving a fixed record set, counting fetches.
pub struct StubSnapshots {
    records: Vec<StateRecord>,
    fetches: Arc<Mutex<usize>>,
}

impl StubSnapshots {
    pub fn new(records: Vec<StateRecord>) -> Self {
        Self {
            records,
            fetches: Arc::new(Mutex::new(0)),
        }
    }

    /// Number of fetches served so far.
    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock()
    }
}

impl Default for StubSnapshots {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl StateSnapshotProvider for StubSnapshots {
    async fn fetch_recent(
        &self,
        _user_id: i64,
        limit: usize,
    ) -> Result<Vec<StateRecord>, SnapshotError> {
        *self.fetches.lock() += 1;
        Ok(self.records.iter().take(limit).cloned().collect())
    }
}

/// Snapshot provider that always fails.
pub struct FailingSnapshots {
    message: String,
}

impl FailingSnapshots {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl StateSnapshotProvider for FailingSnapshots {
    async fn fetch_recent(
        &self,
        _user_id: i64,
        _limit: usize,
    ) -> Result<Vec<StateRecord>, SnapshotError> {
        Err(SnapshotError::Fetch(self.message.clone()))
    }
}
