//! Event types for pipeline activity streaming
//!
//! These events represent all observable activity of one orchestrator:
//! - Stage lifecycle (submission, polling progress, terminal status)
//! - Artifact import
//! - State transitions with the freshly derived readiness

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Readiness, Stage};

/// Core event enum - the vocabulary of pipeline activity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    // === Stage Lifecycle ===
    /// A stage submission is about to be sent
    SubmissionStarted { session_id: String, stage: Stage },
    /// The remote service accepted the submission
    TaskSubmitted {
        session_id: String,
        stage: Stage,
        task_id: String,
    },
    /// A non-terminal status was observed
    PollProgress {
        session_id: String,
        stage: Stage,
        task_id: String,
        status: String,
        progress: u8,
        attempt: u32,
    },
    /// A terminal status was observed
    TaskFinished {
        session_id: String,
        stage: Stage,
        task_id: String,
        status: String,
    },

    // === Artifact Import ===
    /// The artifact consumer was asked to import a URL
    ImportStarted {
        session_id: String,
        stage: Stage,
        url: String,
    },
    /// The artifact consumer reported back
    ImportFinished {
        session_id: String,
        stage: Stage,
        success: bool,
        message: String,
    },

    // === State ===
    /// The pipeline moved to a new state
    StateChanged {
        session_id: String,
        state: String,
        description: String,
        readiness: Readiness,
    },
    /// A stage ended in a terminal failure
    Failed {
        session_id: String,
        stage: Stage,
        message: String,
    },
    /// A late result arrived for a session that has since been overwritten
    StaleResultDiscarded {
        session_id: String,
        stage: Stage,
        task_id: Option<String>,
    },
    /// The caller reset the session
    SessionReset { session_id: String },
}

impl PipelineEvent {
    /// Get the session ID for this event
    pub fn session_id(&self) -> &str {
        match self {
            PipelineEvent::SubmissionStarted { session_id, .. }
            | PipelineEvent::TaskSubmitted { session_id, .. }
            | PipelineEvent::PollProgress { session_id, .. }
            | PipelineEvent::TaskFinished { session_id, .. }
            | PipelineEvent::ImportStarted { session_id, .. }
            | PipelineEvent::ImportFinished { session_id, .. }
            | PipelineEvent::StateChanged { session_id, .. }
            | PipelineEvent::Failed { session_id, .. }
            | PipelineEvent::StaleResultDiscarded { session_id, .. }
            | PipelineEvent::SessionReset { session_id } => session_id,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::SubmissionStarted { .. } => "SubmissionStarted",
            PipelineEvent::TaskSubmitted { .. } => "TaskSubmitted",
            PipelineEvent::PollProgress { .. } => "PollProgress",
            PipelineEvent::TaskFinished { .. } => "TaskFinished",
            PipelineEvent::ImportStarted { .. } => "ImportStarted",
            PipelineEvent::ImportFinished { .. } => "ImportFinished",
            PipelineEvent::StateChanged { .. } => "StateChanged",
            PipelineEvent::Failed { .. } => "Failed",
            PipelineEvent::StaleResultDiscarded { .. } => "StaleResultDiscarded",
            PipelineEvent::SessionReset { .. } => "SessionReset",
        }
    }
}

/// A timestamped event for JSON output
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub event: PipelineEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(event: PipelineEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
