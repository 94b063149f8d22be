//! Runner registry covering the closed agent kind set.

use crate::error::CoreError;
use crate::runner::AgentRunner;
use lifeagent_protocol::{ALL_AGENTS, AgentKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable mapping from every agent kind to its runner.
///
/// Construction fails unless all four kinds are bound, so lookups after
/// that only miss if the map was built outside `new`.
#[derive(Clone)]
pub(crate) struct AgentRegistry {
    runners: Arc<HashMap<AgentKind, Arc<dyn AgentRunner>>>,
}

impl AgentRegistry {
    /// Validate that every kind has a runner and freeze the mapping.
    pub(crate) fn new(
        runners: HashMap<AgentKind, Arc<dyn AgentRunner>>,
    ) -> Result<Self, CoreError> {
        for kind in ALL_AGENTS {
            if !runners.contains_key(&kind) {
                return Err(CoreError::MissingRunner(kind));
            }
        }
        Ok(Self {
            runners: Arc::new(runners),
        })
    }

    /// Fetch the runner for a kind.
    pub(crate) fn get(&self, kind: AgentKind) -> Result<Arc<dyn AgentRunner>, CoreError> {
        self.runners
            .get(&kind)
            .cloned()
            .ok_or(CoreError::MissingRunner(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::AgentRegistry;
    use crate::error::CoreError;
    use crate::runner::{AgentRunner, RunnerOutput};
    use crate::types::{ContextCache, Message};
    use async_trait::async_trait;
    use lifeagent_protocol::{ALL_AGENTS, AgentKind, EventSink};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct SilentRunner;

    #[async_trait]
    impl AgentRunner for SilentRunner {
        async fn run(
            &self,
            _user_id: i64,
            _messages: &[Message],
            _cache: &mut ContextCache,
            _events: Option<&dyn EventSink>,
        ) -> Result<RunnerOutput, CoreError> {
            Ok(RunnerOutput::default())
        }
    }

    #[test]
    fn registry_requires_every_kind() {
        let mut runners: HashMap<AgentKind, Arc<dyn AgentRunner>> = HashMap::new();
        runners.insert(AgentKind::Manager, Arc::new(SilentRunner));
        runners.insert(AgentKind::Goal, Arc::new(SilentRunner));

        let err = AgentRegistry::new(runners).err().expect("missing runner");
        match err {
            CoreError::MissingRunner(kind) => assert_eq!(kind.is_specialist(), true),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn registry_resolves_all_kinds_once_complete() {
        let mut runners: HashMap<AgentKind, Arc<dyn AgentRunner>> = HashMap::new();
        for kind in ALL_AGENTS {
            runners.insert(kind, Arc::new(SilentRunner));
        }
        let registry = AgentRegistry::new(runners).expect("registry");
        for kind in ALL_AGENTS {
            assert_eq!(registry.get(kind).is_ok(), true);
        }
    }
}
