//! Event Bus - pub/sub for pipeline events
//!
//! Uses a tokio broadcast channel so any number of front ends (CLI printer,
//! UI, loggers) can follow one orchestrator without it knowing about them.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::PipelineEvent;
use crate::domain::{PipelineState, Readiness, Stage};

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// Central event bus for one orchestrator
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped; a lagging
    /// subscriber loses the oldest events.
    pub fn emit(&self, event: PipelineEvent) {
        debug!(
            event_type = event.event_type(),
            session_id = event.session_id(),
            "EventBus::emit"
        );
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter bound to one session
    pub fn emitter_for(&self, session_id: impl Into<String>) -> EventEmitter {
        EventEmitter {
            tx: self.tx.clone(),
            session_id: session_id.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Cheap, cloneable handle that stamps events with a session ID
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<PipelineEvent>,
    session_id: String,
}

impl EventEmitter {
    /// An emitter with no subscribers, for callers that do not observe events
    pub fn detached() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            session_id: String::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn emit(&self, event: PipelineEvent) {
        debug!(event_type = event.event_type(), "EventEmitter::emit");
        let _ = self.tx.send(event);
    }

    // === Convenience methods ===

    pub fn submission_started(&self, stage: Stage) {
        self.emit(PipelineEvent::SubmissionStarted {
            session_id: self.session_id.clone(),
            stage,
        });
    }

    pub fn task_submitted(&self, stage: Stage, task_id: &str) {
        self.emit(PipelineEvent::TaskSubmitted {
            session_id: self.session_id.clone(),
            stage,
            task_id: task_id.to_string(),
        });
    }

    pub fn poll_progress(&self, stage: Stage, task_id: &str, status: &str, progress: u8, attempt: u32) {
        self.emit(PipelineEvent::PollProgress {
            session_id: self.session_id.clone(),
            stage,
            task_id: task_id.to_string(),
            status: status.to_string(),
            progress,
            attempt,
        });
    }

    pub fn task_finished(&self, stage: Stage, task_id: &str, status: &str) {
        self.emit(PipelineEvent::TaskFinished {
            session_id: self.session_id.clone(),
            stage,
            task_id: task_id.to_string(),
            status: status.to_string(),
        });
    }

    pub fn import_started(&self, stage: Stage, url: &str) {
        self.emit(PipelineEvent::ImportStarted {
            session_id: self.session_id.clone(),
            stage,
            url: url.to_string(),
        });
    }

    pub fn import_finished(&self, stage: Stage, success: bool, message: &str) {
        self.emit(PipelineEvent::ImportFinished {
            session_id: self.session_id.clone(),
            stage,
            success,
            message: message.to_string(),
        });
    }

    pub fn state_changed(&self, state: &PipelineState, readiness: Readiness) {
        self.emit(PipelineEvent::StateChanged {
            session_id: self.session_id.clone(),
            state: state.name().to_string(),
            description: state.describe(),
            readiness,
        });
    }

    pub fn failed(&self, stage: Stage, message: &str) {
        self.emit(PipelineEvent::Failed {
            session_id: self.session_id.clone(),
            stage,
            message: message.to_string(),
        });
    }

    pub fn stale_result_discarded(&self, stage: Stage, task_id: Option<&str>) {
        self.emit(PipelineEvent::StaleResultDiscarded {
            session_id: self.session_id.clone(),
            stage,
            task_id: task_id.map(str::to_string),
        });
    }

    pub fn session_reset(&self) {
        self.emit(PipelineEvent::SessionReset {
            session_id: self.session_id.clone(),
        });
    }
}
