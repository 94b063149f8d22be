use lifeagent_protocol::{EventMsg, EventSink};
use parking_lot::Mutex;

/// Event sink that collects everything emitted at it.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<EventMsg>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event seen so far, in emission order.
    pub fn events(&self) -> Vec<EventMsg> {
        self.events.lock().clone()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: EventMsg) {
        self.events.lock().push(event);
    }
}
