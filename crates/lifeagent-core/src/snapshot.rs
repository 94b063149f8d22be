//! Recent-state snapshot collaborator used to warm the per-turn cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One stored state check-in; the record schema stays with the domain store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateRecord {
    /// Row identifier in the domain store.
    pub id: i64,
    /// When the check-in was recorded.
    pub created_at: DateTime<Utc>,
    /// Opaque check-in payload.
    pub data: Value,
}

/// Errors returned by snapshot providers.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The underlying fetch failed.
    #[error("fetch failed: {0}")]
    Fetch(String),
}

/// Source of recent state check-ins for session cache warm-up.
///
/// Queried once per session before the first runner invocation; a failure
/// here is never fatal to a turn, agents just run without the hint.
#[async_trait]
pub trait StateSnapshotProvider: Send + Sync {
    /// Fetch up to `limit` most recent state records for a user.
    async fn fetch_recent(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<StateRecord>, SnapshotError>;
}
