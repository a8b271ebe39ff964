//! TaskRecord domain type
//!
//! One remote generation job as observed through the status endpoint.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Pipeline stage a remote task belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Cheap, fast draft mesh
    Preview,
    /// Higher-quality pass seeded by a succeeded preview
    Refine,
}

impl Stage {
    /// Value of the `mode` field in submit request bodies
    pub fn mode(&self) -> &'static str {
        match self {
            Stage::Preview => "preview",
            Stage::Refine => "refine",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mode())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "preview" => Ok(Stage::Preview),
            "refine" => Ok(Stage::Refine),
            other => Err(format!("Unknown stage '{}'. Expected: preview, refine", other)),
        }
    }
}

/// Remote task status
///
/// Any value other than the four known wire strings is kept verbatim in
/// `Other` and treated as terminal, so polling never spins on a state it
/// does not understand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Other(String),
}

impl TaskStatus {
    /// Wire representation (upper snake case)
    pub fn as_wire_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Other(s) => s,
        }
    }

    /// No further polling happens after a terminal status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

impl From<&str> for TaskStatus {
    fn from(s: &str) -> Self {
        match s {
            "PENDING" => TaskStatus::Pending,
            "IN_PROGRESS" => TaskStatus::InProgress,
            "SUCCEEDED" => TaskStatus::Succeeded,
            "FAILED" => TaskStatus::Failed,
            other => {
                debug!(status = %other, "TaskStatus::from: unrecognized status");
                TaskStatus::Other(other.to_string())
            }
        }
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        TaskStatus::from(s.as_str())
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_wire_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire_str())
    }
}

/// Download URLs for the formats a succeeded task produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUrls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fbx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obj: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usdz: Option<String>,
}

impl ModelUrls {
    /// Primary mesh URL (glb), if present and non-blank
    pub fn primary(&self) -> Option<&str> {
        self.glb.as_deref().map(str::trim).filter(|url| !url.is_empty())
    }
}

/// Error reported by the remote service for a failed task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Informational timestamps of a remote task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTimestamps {
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskTimestamps {
    /// Build from the Unix-millisecond values on the wire (0 means unset)
    pub fn from_millis(created_at: i64, started_at: i64, finished_at: i64) -> Self {
        fn convert(ms: i64) -> Option<DateTime<Utc>> {
            if ms <= 0 {
                return None;
            }
            Utc.timestamp_millis_opt(ms).single()
        }

        Self {
            created_at: convert(created_at),
            started_at: convert(started_at),
            finished_at: convert(finished_at),
        }
    }
}

/// One remote job instance
///
/// A record whose status is terminal is never re-polled and never mutated;
/// the session stores it as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Opaque identifier assigned by the remote service
    pub id: String,

    /// Stage this task was submitted for
    pub stage: Stage,

    /// Current status
    pub status: TaskStatus,

    /// Progress percentage (informational only)
    pub progress: u8,

    /// Named download URLs, present once the task succeeded
    #[serde(default)]
    pub artifacts: Option<ModelUrls>,

    /// Remote error, populated only for failed tasks
    #[serde(default)]
    pub error: Option<TaskError>,

    /// Created/started/finished timestamps
    #[serde(default)]
    pub timestamps: TaskTimestamps,

    /// Pass-through metadata
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub art_style: Option<String>,
    #[serde(default)]
    pub preceding_tasks: Option<u32>,
}

impl TaskRecord {
    /// Create a record with only the required fields set
    pub fn new(id: impl Into<String>, stage: Stage, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            stage,
            status,
            progress: 0,
            artifacts: None,
            error: None,
            timestamps: TaskTimestamps::default(),
            thumbnail_url: None,
            prompt: None,
            art_style: None,
            preceding_tasks: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }

    /// Primary mesh URL, if the task produced a usable one
    pub fn model_url(&self) -> Option<&str> {
        self.artifacts.as_ref().and_then(ModelUrls::primary)
    }

    /// Remote error message, if the service provided a non-blank one
    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_ref()
            .and_then(|e| e.message.as_deref())
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}
