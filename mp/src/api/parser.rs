//! Response parser - JSON bodies to typed records

use tracing::{debug, warn};

use super::types::{ErrorBody, StatusResponse, SubmitResponse};
use crate::domain::{Stage, TaskRecord, TaskStatus, TaskTimestamps};
use crate::error::PipelineError;

/// Extract the task id from a submit response
///
/// The service answers submissions with either `{"result": "<id>"}` or a full
/// status object; both are accepted and neither is treated as authoritative.
/// This tolerance applies to the submit endpoint only.
pub fn parse_submit_response(body: &[u8]) -> Result<String, PipelineError> {
    debug!(bytes = body.len(), "parse_submit_response: called");

    if let Ok(wrapper) = serde_json::from_slice::<SubmitResponse>(body) {
        let id = wrapper.result.trim();
        if !id.is_empty() {
            debug!(task_id = %id, "parse_submit_response: result wrapper");
            return Ok(id.to_string());
        }
    }

    warn!("parse_submit_response: no 'result' field, trying full status shape");
    match serde_json::from_slice::<StatusResponse>(body) {
        Ok(status) if !status.id.trim().is_empty() => {
            debug!(task_id = %status.id, "parse_submit_response: status shape");
            Ok(status.id.trim().to_string())
        }
        Ok(_) => Err(PipelineError::MalformedResponse(format!(
            "submit response has an empty id: {}",
            snippet(body)
        ))),
        Err(e) => Err(PipelineError::MalformedResponse(format!(
            "submit response has no result or id ({}): {}",
            e,
            snippet(body)
        ))),
    }
}

/// Decode a status response into a [`TaskRecord`] for the given stage
pub fn parse_status_response(body: &[u8], stage: Stage) -> Result<TaskRecord, PipelineError> {
    debug!(bytes = body.len(), %stage, "parse_status_response: called");

    let wire: StatusResponse = serde_json::from_slice(body).map_err(|e| {
        PipelineError::MalformedResponse(format!("status response ({}): {}", e, snippet(body)))
    })?;

    if wire.id.trim().is_empty() {
        return Err(PipelineError::MalformedResponse(format!(
            "status response has an empty id: {}",
            snippet(body)
        )));
    }

    let status = TaskStatus::from(wire.status.as_str());
    let progress = wire.progress.map_or(0, |p| p.round().clamp(0.0, 100.0) as u8);

    // task_error is only meaningful for failed tasks; the service sends an
    // empty object otherwise
    let error = if status == TaskStatus::Failed { wire.task_error } else { None };

    Ok(TaskRecord {
        id: wire.id,
        stage,
        status,
        progress,
        artifacts: wire.model_urls,
        error,
        timestamps: TaskTimestamps::from_millis(
            wire.created_at.unwrap_or(0),
            wire.started_at.unwrap_or(0),
            wire.finished_at.unwrap_or(0),
        ),
        thumbnail_url: wire.thumbnail_url,
        prompt: wire.prompt,
        art_style: wire.art_style,
        preceding_tasks: wire.preceding_tasks,
    })
}

/// Best-effort error message from a failed response body
///
/// Uses the JSON `message` field when present, otherwise the raw text.
pub fn parse_error_message(body: &[u8]) -> String {
    if let Ok(ErrorBody { message: Some(message) }) = serde_json::from_slice::<ErrorBody>(body) {
        let message = message.trim();
        if !message.is_empty() {
            return message.to_string();
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() { "(empty body)".to_string() } else { text }
}

/// Truncated body text for error messages
fn snippet(body: &[u8]) -> String {
    const MAX: usize = 200;
    let text = String::from_utf8_lossy(body);
    if text.chars().count() > MAX {
        format!("{}...", text.chars().take(MAX).collect::<String>())
    } else {
        text.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SUCCEEDED_BODY: &str = r#"{
        "id": "018a210d-8ba4-705c-b111-1f1776f7f578",
        "model_urls": {
            "glb": "https://assets.meshy.ai/tasks/model.glb",
            "fbx": "https://assets.meshy.ai/tasks/model.fbx",
            "usdz": "https://assets.meshy.ai/tasks/model.usdz",
            "obj": "https://assets.meshy.ai/tasks/model.obj",
            "mtl": "https://assets.meshy.ai/tasks/model.mtl"
        },
        "thumbnail_url": "https://assets.meshy.ai/tasks/preview.png",
        "prompt": "a monster mask",
        "art_style": "realistic",
        "progress": 100,
        "started_at": 1692771667037,
        "created_at": 1692771650657,
        "finished_at": 1692771669037,
        "status": "SUCCEEDED",
        "texture_urls": [{"base_color": "https://assets.meshy.ai/tasks/0.png"}],
        "preceding_tasks": 0,
        "task_error": {"message": ""}
    }"#;

    #[test]
    fn test_submit_result_shape() {
        assert_eq!(parse_submit_response(br#"{"result":"abc"}"#).unwrap(), "abc");
    }

    #[test]
    fn test_submit_status_shape() {
        let body = br#"{"id":"abc","status":"PENDING","progress":0}"#;
        assert_eq!(parse_submit_response(body).unwrap(), "abc");
    }

    #[test]
    fn test_submit_empty_result_falls_back_to_id() {
        let body = br#"{"result":"","id":"abc","status":"PENDING"}"#;
        assert_eq!(parse_submit_response(body).unwrap(), "abc");
    }

    #[test]
    fn test_submit_rejects_unknown_shape() {
        let err = parse_submit_response(br#"{"task":"abc"}"#).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse(_)));

        let err = parse_submit_response(b"not json").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse(_)));

        let err = parse_submit_response(br#"{"id":"  ","status":"PENDING"}"#).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse(_)));
    }

    proptest! {
        #[test]
        fn prop_submit_shapes_agree(id in "[A-Za-z0-9][A-Za-z0-9-]{0,40}") {
            let a = serde_json::json!({ "result": id }).to_string();
            let b = serde_json::json!({ "id": id, "status": "PENDING", "progress": 0 }).to_string();
            prop_assert_eq!(parse_submit_response(a.as_bytes()).unwrap(), id.clone());
            prop_assert_eq!(parse_submit_response(b.as_bytes()).unwrap(), id);
        }
    }

    #[test]
    fn test_status_full_body() {
        let record = parse_status_response(SUCCEEDED_BODY.as_bytes(), Stage::Preview).unwrap();

        assert_eq!(record.id, "018a210d-8ba4-705c-b111-1f1776f7f578");
        assert_eq!(record.stage, Stage::Preview);
        assert_eq!(record.status, TaskStatus::Succeeded);
        assert_eq!(record.progress, 100);
        assert_eq!(record.model_url(), Some("https://assets.meshy.ai/tasks/model.glb"));
        assert_eq!(record.prompt.as_deref(), Some("a monster mask"));
        assert!(record.timestamps.finished_at.is_some());
        // empty task_error on a succeeded task is dropped
        assert!(record.error.is_none());
    }

    #[test]
    fn test_status_failed_keeps_error() {
        let body = br#"{"id":"t1","status":"FAILED","progress":40,
            "task_error":{"code":"quota","message":"quota exceeded"}}"#;
        let record = parse_status_response(body, Stage::Refine).unwrap();

        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error_message(), Some("quota exceeded"));
        assert_eq!(record.error.and_then(|e| e.code).as_deref(), Some("quota"));
    }

    #[test]
    fn test_status_minimal_body() {
        let record = parse_status_response(br#"{"id":"t1","status":"IN_PROGRESS"}"#, Stage::Preview).unwrap();
        assert_eq!(record.status, TaskStatus::InProgress);
        assert_eq!(record.progress, 0);
        assert!(record.artifacts.is_none());
    }

    #[test]
    fn test_status_missing_required_fields() {
        let err = parse_status_response(br#"{"status":"PENDING"}"#, Stage::Preview).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse(_)));

        let err = parse_status_response(br#"{"id":"t1"}"#, Stage::Preview).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse(_)));

        // wrong type
        let err = parse_status_response(br#"{"id":7,"status":"PENDING"}"#, Stage::Preview).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse(_)));
    }

    #[test]
    fn test_status_progress_is_clamped() {
        let record = parse_status_response(br#"{"id":"t1","status":"PENDING","progress":250}"#, Stage::Preview).unwrap();
        assert_eq!(record.progress, 100);
    }

    #[test]
    fn test_status_metadata_type_drift_is_tolerated() {
        let body = br#"{"id":"t1","status":"SUCCEEDED","progress":42.5,
            "preceding_tasks":-1,
            "started_at":"2024-01-01T00:00:00Z",
            "created_at":"yesterday",
            "finished_at":1692771669037.0,
            "prompt":17,
            "model_urls":{"glb":"https://assets.meshy.ai/tasks/model.glb"}}"#;
        let record = parse_status_response(body, Stage::Preview).unwrap();

        assert_eq!(record.status, TaskStatus::Succeeded);
        assert_eq!(record.progress, 43);
        assert_eq!(record.preceding_tasks, None);
        assert_eq!(
            record.timestamps.started_at.map(|t| t.timestamp_millis()),
            Some(1_704_067_200_000)
        );
        assert!(record.timestamps.created_at.is_none());
        assert_eq!(
            record.timestamps.finished_at.map(|t| t.timestamp_millis()),
            Some(1_692_771_669_037)
        );
        assert!(record.prompt.is_none());
        assert_eq!(record.model_url(), Some("https://assets.meshy.ai/tasks/model.glb"));
    }

    #[test]
    fn test_status_metadata_drift_does_not_excuse_bad_status() {
        let body = br#"{"id":"t1","status":3,"progress":"half"}"#;
        let err = parse_status_response(body, Stage::Preview).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse(_)));
    }

    #[test]
    fn test_error_message_prefers_json_message() {
        assert_eq!(parse_error_message(br#"{"message":"Invalid API key"}"#), "Invalid API key");
        assert_eq!(parse_error_message(b"Bad Gateway"), "Bad Gateway");
        assert_eq!(parse_error_message(b""), "(empty body)");
    }
}
