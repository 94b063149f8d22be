//! Test helpers shared across Life Agent crates.

pub mod events;
pub mod history;
pub mod runner;
pub mod snapshot;

pub use events::CollectingSink;
pub use history::{FailingHistory, MemoryHistoryStore};
pub use runner::{FailingRunner, RecordingRunner, ScriptedRunner, StreamingRunner};
pub use snapshot::{FailingSnapshots, StubSnapshots};
