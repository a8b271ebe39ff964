//! Pipeline error types

use std::time::Duration;
use thiserror::Error;

use crate::domain::Stage;

/// Errors that can occur while driving a generation pipeline
///
/// Every failure surfaces to the caller as a typed reason; the failure state
/// of a session carries one of these, so the enum is `Clone` and keeps
/// transport-level causes as rendered strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} - {message}")]
    Protocol { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("{message}")]
    RemoteTaskFailed { code: Option<String>, message: String },

    #[error("Task has unexpected status: {0}")]
    UnexpectedStatus(String),

    #[error("timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("Polling task {task_id} failed: {source}")]
    PollFailed {
        task_id: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("No successful preview available to refine")]
    NoPreviewToRefine,

    #[error("A {0} submission is already in flight")]
    SubmissionInFlight(Stage),

    #[error("Please enter a prompt")]
    EmptyPrompt,

    #[error("Task {task_id} succeeded, but no GLB model URL was found")]
    MissingArtifact { task_id: String },

    #[error("Artifact import failed: {0}")]
    ImportFailed(String),

    #[error("Result discarded: the session was reset while the task was in flight")]
    Superseded,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Check if this error was raised by a guard before any work started
    ///
    /// Guard violations leave the session untouched; every other error is
    /// recorded as a terminal failure of the stage that raised it.
    pub fn is_guard_violation(&self) -> bool {
        matches!(
            self,
            PipelineError::NoPreviewToRefine | PipelineError::SubmissionInFlight(_) | PipelineError::EmptyPrompt
        )
    }

    /// Check if this error came from the network or HTTP layer
    pub fn is_transport(&self) -> bool {
        match self {
            PipelineError::Network(_) | PipelineError::Protocol { .. } => true,
            PipelineError::PollFailed { source, .. } => source.is_transport(),
            _ => false,
        }
    }

    /// Remote error code, if the remote service reported one
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            PipelineError::RemoteTaskFailed { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::MalformedResponse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_in_seconds() {
        let err = PipelineError::Timeout(Duration::from_secs(600));
        assert_eq!(err.to_string(), "timed out after 600 seconds");
    }

    #[test]
    fn test_remote_failure_message_is_verbatim() {
        let err = PipelineError::RemoteTaskFailed {
            code: Some("quota".to_string()),
            message: "quota exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "quota exceeded");
        assert_eq!(err.remote_code(), Some("quota"));
    }

    #[test]
    fn test_is_guard_violation() {
        assert!(PipelineError::NoPreviewToRefine.is_guard_violation());
        assert!(PipelineError::SubmissionInFlight(Stage::Preview).is_guard_violation());
        assert!(PipelineError::EmptyPrompt.is_guard_violation());

        assert!(!PipelineError::Timeout(Duration::from_secs(1)).is_guard_violation());
        assert!(!PipelineError::ImportFailed("bad".to_string()).is_guard_violation());
    }

    #[test]
    fn test_is_transport_looks_through_poll_failed() {
        let err = PipelineError::PollFailed {
            task_id: "abc".to_string(),
            source: Box::new(PipelineError::Network("connection reset".to_string())),
        };
        assert!(err.is_transport());
        assert!(err.to_string().contains("connection reset"));

        let err = PipelineError::PollFailed {
            task_id: "abc".to_string(),
            source: Box::new(PipelineError::MalformedResponse("eof".to_string())),
        };
        assert!(!err.is_transport());
    }

    #[test]
    fn test_protocol_message() {
        let err = PipelineError::Protocol {
            status: 401,
            message: "Invalid API key".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 401 - Invalid API key");
    }
}
