//! Configuration schema for the Life Agent dispatcher.

use serde::{Deserialize, Serialize};

/// Root config for the Life Agent SDK.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LifeagentConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

impl LifeagentConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> LifeagentConfigBuilder {
        LifeagentConfigBuilder::new()
    }
}

/// Builder for assembling a `LifeagentConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct LifeagentConfigBuilder {
    config: LifeagentConfig,
}

impl LifeagentConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: LifeagentConfig::default(),
        }
    }

    /// Replace the dispatcher configuration.
    pub fn dispatcher(mut self, dispatcher: DispatcherConfig) -> Self {
        self.config.dispatcher = dispatcher;
        self
    }

    /// Replace the runner configuration.
    pub fn runner(mut self, runner: RunnerConfig) -> Self {
        self.config.runner = runner;
        self
    }

    /// Replace the history persistence configuration.
    pub fn history(mut self, history: HistoryConfig) -> Self {
        self.config.history = history;
        self
    }

    /// Replace the snapshot warm-up configuration.
    pub fn snapshot(mut self, snapshot: SnapshotConfig) -> Self {
        self.config.snapshot = snapshot;
        self
    }

    /// Finalize and return the built `LifeagentConfig`.
    pub fn build(self) -> LifeagentConfig {
        self.config
    }
}

/// Settings for turn routing and event streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Session id used when a caller does not name one.
    #[serde(default = "default_session_id")]
    pub default_session_id: String,
    /// Broadcast buffer size for streamed turn events.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_session_id: default_session_id(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

/// Default reserved session id.
fn default_session_id() -> String {
    "default".to_string()
}

/// Default broadcast buffer size for streamed events.
fn default_stream_buffer() -> usize {
    512
}

/// Settings shared by agent runner implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Upper bound on an agent's internal tool-call iterations per run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

/// Default tool-loop iteration cap for runners.
fn default_max_iterations() -> usize {
    10
}

/// Durable history persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HistoryConfig {
    /// Root directory for history rollouts; resolved by the caller.
    #[serde(default)]
    pub path: Option<String>,
}

/// Recent-state snapshot warm-up settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Number of recent state records fetched into the per-session cache.
    #[serde(default = "default_snapshot_limit")]
    pub limit: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            limit: default_snapshot_limit(),
        }
    }
}

/// Default record count for the recent-state warm-up fetch.
fn default_snapshot_limit() -> usize {
    5
}
