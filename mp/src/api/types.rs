//! Wire types for the text-to-3D service
//!
//! Field names match the service's JSON exactly.

use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::{ModelUrls, TaskError};

/// Body of a preview submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewRequest {
    pub mode: &'static str,
    pub prompt: String,
    pub art_style: String,
    pub should_remesh: bool,
    pub target_polycount: u32,
}

impl PreviewRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            mode: "preview",
            prompt: prompt.into(),
            art_style: "realistic".to_string(),
            should_remesh: true,
            target_polycount: 30_000,
        }
    }
}

/// Body of a refine submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefineRequest {
    pub mode: &'static str,
    pub preview_task_id: String,
    pub enable_pbr: bool,
}

impl RefineRequest {
    pub fn new(preview_task_id: impl Into<String>) -> Self {
        Self {
            mode: "refine",
            preview_task_id: preview_task_id.into(),
            enable_pbr: true,
        }
    }
}

/// Submit response shape A: a bare task id wrapper
#[derive(Debug, Deserialize)]
pub(crate) struct SubmitResponse {
    pub result: String,
}

/// Status response (also submit response shape B)
///
/// Only `id` and `status` are strict. Every other field is metadata and
/// decodes as `None` when the service sends an unexpected type.
#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    pub id: String,
    pub status: String,
    #[serde(default, deserialize_with = "lenient")]
    pub progress: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub model_urls: Option<ModelUrls>,
    #[serde(default, deserialize_with = "lenient")]
    pub thumbnail_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub prompt: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub art_style: Option<String>,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub started_at: Option<i64>,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub created_at: Option<i64>,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub finished_at: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub preceding_tasks: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub task_error: Option<TaskError>,
}

/// Optional field where a value of the wrong type reads as absent
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| serde_json::from_value(value).ok()))
}

/// Epoch milliseconds from a number or an RFC 3339 string
fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.timestamp_millis()),
        _ => None,
    })
}

/// Error body returned with non-2xx responses
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
