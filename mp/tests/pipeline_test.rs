//! End-to-end pipeline tests through the public API
//!
//! A routing transport stands in for the remote service and its asset CDN;
//! the real download importer writes into a temporary cache directory.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use meshpipe::api::{GenerationClient, HttpRequest, HttpResponse, Method, Transport, TransportError};
use meshpipe::config::ServiceConfig;
use meshpipe::domain::{PipelineState, Stage};
use meshpipe::events::PipelineEvent;
use meshpipe::import::DownloadImporter;
use meshpipe::poller::Poller;
use meshpipe::{Orchestrator, PipelineError};

const SUBMIT_URL: &str = "https://gen.test/v2/text-to-3d";
const STATUS_BASE: &str = "https://gen.test/v2/text-to-3d/";

/// Fake service: submissions hand out queued task ids, status requests
/// replay a per-task status script (the last entry repeats), and anything
/// else is served from the asset table
#[derive(Default)]
struct FakeService {
    task_ids: Mutex<VecDeque<String>>,
    statuses: Mutex<HashMap<String, VecDeque<String>>>,
    assets: Mutex<HashMap<String, Vec<u8>>>,
    log: Mutex<Vec<(Method, String)>>,
}

impl FakeService {
    fn task(&self, id: &str, statuses: &[String]) {
        self.task_ids.lock().unwrap().push_back(id.to_string());
        self.statuses
            .lock()
            .unwrap()
            .insert(id.to_string(), statuses.iter().cloned().collect());
    }

    fn asset(&self, url: &str, bytes: Vec<u8>) {
        self.assets.lock().unwrap().insert(url.to_string(), bytes);
    }

    fn count(&self, method: Method, prefix: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, url)| *m == method && url.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl Transport for FakeService {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.log.lock().unwrap().push((request.method, request.url.clone()));

        if request.method == Method::Post && request.url == SUBMIT_URL {
            let id = self
                .task_ids
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| TransportError::Network("no task queued".to_string()))?;
            return Ok(HttpResponse::ok(format!(r#"{{"result":"{}"}}"#, id).into_bytes()));
        }

        if let Some(id) = request.url.strip_prefix(STATUS_BASE) {
            let mut statuses = self.statuses.lock().unwrap();
            let script = statuses.get_mut(id).ok_or_else(|| TransportError::Protocol {
                status: 404,
                body: br#"{"message":"Task not found"}"#.to_vec(),
            })?;
            let body = if script.len() > 1 {
                script.pop_front().unwrap_or_default()
            } else {
                script.front().cloned().unwrap_or_default()
            };
            return Ok(HttpResponse::ok(body.into_bytes()));
        }

        match self.assets.lock().unwrap().get(&request.url) {
            Some(bytes) => Ok(HttpResponse::ok(bytes.clone())),
            None => Err(TransportError::Protocol {
                status: 404,
                body: b"NoSuchKey".to_vec(),
            }),
        }
    }
}

fn status(id: &str, status: &str, progress: u8) -> String {
    format!(r#"{{"id":"{}","status":"{}","progress":{}}}"#, id, status, progress)
}

fn succeeded(id: &str, glb: &str) -> String {
    format!(
        r#"{{"id":"{}","status":"SUCCEEDED","progress":100,"model_urls":{{"glb":"{}"}},"thumbnail_url":"https://cdn.test/{}.png"}}"#,
        id, glb, id
    )
}

fn glb_bytes(len: usize) -> Vec<u8> {
    let mut bytes = b"glTF".to_vec();
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&(len as u32).to_le_bytes());
    bytes.resize(len, 0);
    bytes
}

fn pipeline(service: Arc<FakeService>, cache: &TempDir, interval_secs: u64, max_wait_secs: u64) -> Orchestrator {
    let service_config = ServiceConfig {
        submit_url: SUBMIT_URL.to_string(),
        status_url_base: STATUS_BASE.to_string(),
        ..Default::default()
    };
    let client = Arc::new(GenerationClient::new(service.clone(), service_config, "msy_test_key"));
    let poller = Poller::new(
        Arc::clone(&client),
        Duration::from_secs(interval_secs),
        Duration::from_secs(max_wait_secs),
    );
    let importer = Arc::new(DownloadImporter::new(service, cache.path()));
    Orchestrator::new(client, poller, importer)
}

#[tokio::test(start_paused = true)]
async fn test_preview_then_refine_end_to_end() {
    let cache = TempDir::new().unwrap();
    let service = Arc::new(FakeService::default());
    let preview_url = "https://cdn.test/prev-1/preview.glb?sig=a";
    let refine_url = "https://cdn.test/ref-1/refined.glb?sig=b";
    service.task(
        "prev-1",
        &[
            status("prev-1", "PENDING", 0),
            status("prev-1", "IN_PROGRESS", 45),
            succeeded("prev-1", preview_url),
        ],
    );
    service.task(
        "ref-1",
        &[status("ref-1", "IN_PROGRESS", 10), succeeded("ref-1", refine_url)],
    );
    service.asset(preview_url, glb_bytes(64));
    service.asset(refine_url, glb_bytes(128));

    let orch = pipeline(service.clone(), &cache, 5, 600);

    let state = orch.submit_preview("a low-poly fox").await.unwrap();
    assert_eq!(
        state,
        PipelineState::Ready {
            stage: Stage::Preview,
            task_id: "prev-1".to_string()
        }
    );
    let preview_file = PathBuf::from(orch.session().await.artifact().unwrap().handle.as_str());
    assert_eq!(preview_file.parent(), Some(cache.path()));
    assert!(preview_file.to_string_lossy().ends_with("preview.glb"));
    assert!(preview_file.exists());
    assert_eq!(service.count(Method::Get, STATUS_BASE), 3);

    let readiness = orch.readiness().await;
    assert!(readiness.can_place);
    assert!(readiness.can_submit_refine);

    let state = orch.submit_refine("prev-1").await.unwrap();
    assert_eq!(
        state,
        PipelineState::Ready {
            stage: Stage::Refine,
            task_id: "ref-1".to_string()
        }
    );

    // The preview artifact is released when the refine artifact replaces it
    assert!(!preview_file.exists());
    let session = orch.session().await;
    assert_eq!(session.refine_task().unwrap().id, "ref-1");
    let refine_file = PathBuf::from(session.artifact().unwrap().handle.as_str());
    assert!(refine_file.to_string_lossy().ends_with("refined.glb"));
    assert_eq!(std::fs::read(&refine_file).unwrap().len(), 128);
    assert_eq!(service.count(Method::Post, SUBMIT_URL), 2);
}

#[tokio::test(start_paused = true)]
async fn test_sessions_sharing_a_cache_keep_their_artifacts() {
    let cache = TempDir::new().unwrap();
    let url_a = "https://assets.test/tasks/prev-a/output/model.glb";
    let url_b = "https://assets.test/tasks/prev-b/output/model.glb";

    let service_a = Arc::new(FakeService::default());
    service_a.task("prev-a", &[succeeded("prev-a", url_a)]);
    service_a.asset(url_a, glb_bytes(40));
    let service_b = Arc::new(FakeService::default());
    service_b.task("prev-b", &[succeeded("prev-b", url_b)]);
    service_b.asset(url_b, glb_bytes(80));

    let a = pipeline(service_a, &cache, 5, 600);
    let b = pipeline(service_b, &cache, 5, 600);

    a.submit_preview("a low-poly fox").await.unwrap();
    b.submit_preview("a brass lamp").await.unwrap();

    let file_a = PathBuf::from(a.session().await.artifact().unwrap().handle.as_str());
    let file_b = PathBuf::from(b.session().await.artifact().unwrap().handle.as_str());
    assert_ne!(file_a, file_b);
    assert_eq!(std::fs::read(&file_a).unwrap().len(), 40);

    a.reset().await;

    assert!(!file_a.exists());
    assert!(b.readiness().await.can_place);
    assert_eq!(std::fs::read(&file_b).unwrap().len(), 80);
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_download_withholds_place() {
    let cache = TempDir::new().unwrap();
    let service = Arc::new(FakeService::default());
    let url = "https://cdn.test/prev-1/model.glb";
    service.task("prev-1", &[succeeded("prev-1", url)]);
    service.asset(url, b"<Error>AccessDenied</Error>".to_vec());

    let orch = pipeline(service, &cache, 5, 600);
    let mut events = orch.subscribe();

    let state = orch.submit_preview("a low-poly fox").await.unwrap();

    assert_eq!(
        state,
        PipelineState::PreviewReady {
            task_id: "prev-1".to_string()
        }
    );
    assert!(!orch.readiness().await.can_place);
    assert!(orch.readiness().await.can_submit_refine);
    match orch.degraded().await {
        Some(PipelineError::ImportFailed(message)) => assert!(message.contains("bad magic")),
        other => panic!("unexpected degraded reason: {:?}", other),
    }

    let failures: Vec<String> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|event| match event {
            PipelineEvent::ImportFinished {
                success: false, message, ..
            } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("bad magic"));
}

#[tokio::test(start_paused = true)]
async fn test_poll_budget_is_enforced() {
    let cache = TempDir::new().unwrap();
    let service = Arc::new(FakeService::default());
    service.task("prev-1", &[status("prev-1", "IN_PROGRESS", 5)]);

    let orch = pipeline(service.clone(), &cache, 2, 10);

    let err = orch.submit_preview("a low-poly fox").await.unwrap_err();

    assert_eq!(err.to_string(), "timed out after 10 seconds");
    assert_eq!(service.count(Method::Get, STATUS_BASE), 5);
    assert!(orch.state().await.is_failure());
}

#[tokio::test(start_paused = true)]
async fn test_status_not_found_fails_preview() {
    let cache = TempDir::new().unwrap();
    let service = Arc::new(FakeService::default());
    // Submission succeeds but the service never heard of the task
    service.task_ids.lock().unwrap().push_back("ghost".to_string());

    let orch = pipeline(service, &cache, 5, 600);

    let err = orch.submit_preview("a low-poly fox").await.unwrap_err();

    match &err {
        PipelineError::PollFailed { task_id, source } => {
            assert_eq!(task_id, "ghost");
            assert_eq!(source.to_string(), "HTTP 404 - Task not found");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_transport());
    match orch.state().await {
        PipelineState::PreviewFailed { error } => assert_eq!(error, err),
        other => panic!("unexpected state: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_reset_mid_poll_then_new_prompt() {
    let cache = TempDir::new().unwrap();
    let service = Arc::new(FakeService::default());
    let url = "https://cdn.test/prev-2/model.glb";
    service.task("prev-1", &[status("prev-1", "IN_PROGRESS", 5)]);
    service.task("prev-2", &[succeeded("prev-2", url)]);
    service.asset(url, glb_bytes(32));

    let orch = pipeline(service, &cache, 5, 600);

    let first = orch.clone();
    let abandoned = tokio::spawn(async move { first.submit_preview("first idea").await });
    while !matches!(orch.state().await, PipelineState::PollingPreview { .. }) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    orch.reset().await;
    assert_eq!(abandoned.await.unwrap().unwrap_err(), PipelineError::Superseded);

    let state = orch.submit_preview("second idea").await.unwrap();
    assert_eq!(
        state,
        PipelineState::Ready {
            stage: Stage::Preview,
            task_id: "prev-2".to_string()
        }
    );
    assert_eq!(orch.session().await.preview_task().unwrap().id, "prev-2");
}
