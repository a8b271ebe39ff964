//! Pipeline event streaming
//!
//! The orchestrator and poller emit [`PipelineEvent`]s; front ends subscribe
//! through the [`EventBus`].

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter};
pub use types::{EventLogEntry, PipelineEvent};
