//! Orchestrator - sequences Submit, Poll and Import for one session
//!
//! Guards run under the session lock and reject instead of queuing. The lock
//! is released before every network or import await; after each await the
//! session generation is compared with the one captured when the stage began,
//! and a mismatch discards the result.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, info, warn};

use crate::api::GenerationClient;
use crate::config::Config;
use crate::domain::{ImportedArtifact, PipelineSession, PipelineState, Readiness, Stage, TaskRecord, TaskStatus};
use crate::error::PipelineError;
use crate::events::{EventBus, EventEmitter, PipelineEvent};
use crate::import::{ArtifactImporter, DownloadImporter};
use crate::poller::Poller;

const NO_ERROR_MESSAGE: &str = "No error message provided.";

/// Drives the preview/refine pipeline for a single session
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct Orchestrator {
    session: Arc<Mutex<PipelineSession>>,
    client: Arc<GenerationClient>,
    poller: Poller,
    importer: Arc<dyn ArtifactImporter>,
    events: Arc<EventBus>,
    generation: Arc<watch::Sender<u64>>,
    import_enabled: bool,
}

impl Orchestrator {
    pub fn new(client: Arc<GenerationClient>, poller: Poller, importer: Arc<dyn ArtifactImporter>) -> Self {
        let session = PipelineSession::new();
        debug!(session_id = %session.id(), "Orchestrator::new: called");
        let (generation, _) = watch::channel(session.generation());
        Self {
            session: Arc::new(Mutex::new(session)),
            client,
            poller,
            importer,
            events: Arc::new(EventBus::with_default_capacity()),
            generation: Arc::new(generation),
            import_enabled: true,
        }
    }

    /// Build a reqwest-backed orchestrator with a download importer
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        debug!("Orchestrator::from_config: called");
        let client = Arc::new(GenerationClient::from_config(config)?);
        let poller = Poller::from_config(Arc::clone(&client), &config.polling);
        let importer = Arc::new(DownloadImporter::from_config(client.transport(), &config.import));

        Ok(Self::new(client, poller, importer).with_import_enabled(config.import.enabled))
    }

    /// Skip the import step; succeeded stages stop at `PreviewReady`/`RefineReady`
    pub fn with_import_enabled(mut self, enabled: bool) -> Self {
        self.import_enabled = enabled;
        self
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> PipelineState {
        self.session.lock().await.state()
    }

    pub async fn readiness(&self) -> Readiness {
        self.session.lock().await.readiness()
    }

    /// Why the latest succeeded stage cannot be placed, if it can't
    pub async fn degraded(&self) -> Option<PipelineError> {
        self.session.lock().await.degraded().cloned()
    }

    /// Copy of the current session
    pub async fn session(&self) -> PipelineSession {
        self.session.lock().await.clone()
    }

    /// Generate a preview model for `prompt`
    ///
    /// Invalidates the previous preview, refine and imported artifact. On a
    /// successful remote task returns the resulting state, which is `Ready`
    /// only if the artifact was imported. Terminal failures are returned as
    /// errors and also recorded in the session.
    pub async fn submit_preview(&self, prompt: &str) -> Result<PipelineState, PipelineError> {
        debug!(prompt_len = prompt.len(), "submit_preview: called");
        if prompt.trim().is_empty() {
            warn!("submit_preview: empty prompt rejected");
            return Err(PipelineError::EmptyPrompt);
        }

        let (generation, emitter, replaced) = {
            let mut session = self.session.lock().await;
            if let Some(in_flight) = session.in_flight() {
                debug!(stage = %in_flight.stage, "submit_preview: submission in flight, rejecting");
                return Err(PipelineError::SubmissionInFlight(in_flight.stage));
            }

            let replaced = session.begin_preview();
            self.generation.send_replace(session.generation());
            let emitter = self.events.emitter_for(session.id());
            publish(&emitter, &session);
            (session.generation(), emitter, replaced)
        };

        if let Some(artifact) = replaced {
            self.discard(&artifact).await;
        }

        self.run_stage(Stage::Preview, generation, &emitter, self.client.submit_preview(prompt))
            .await
    }

    /// Refine the succeeded preview identified by `preview_task_id`
    ///
    /// Rejected with `NoPreviewToRefine`, leaving the session untouched, unless
    /// the session holds a succeeded preview with that id.
    pub async fn submit_refine(&self, preview_task_id: &str) -> Result<PipelineState, PipelineError> {
        debug!(%preview_task_id, "submit_refine: called");

        let (generation, emitter) = {
            let mut session = self.session.lock().await;
            if let Some(in_flight) = session.in_flight() {
                debug!(stage = %in_flight.stage, "submit_refine: submission in flight, rejecting");
                return Err(PipelineError::SubmissionInFlight(in_flight.stage));
            }

            let matches_preview = session
                .succeeded_preview()
                .is_some_and(|preview| preview.id == preview_task_id);
            if !matches_preview {
                warn!(%preview_task_id, "submit_refine: no succeeded preview with this id");
                return Err(PipelineError::NoPreviewToRefine);
            }

            session.begin_refine();
            let emitter = self.events.emitter_for(session.id());
            publish(&emitter, &session);
            (session.generation(), emitter)
        };

        self.run_stage(Stage::Refine, generation, &emitter, self.client.submit_refine(preview_task_id))
            .await
    }

    /// Start over with an empty session
    ///
    /// Any imported artifact is discarded and results of work still in flight
    /// will be dropped when they arrive.
    pub async fn reset(&self) -> PipelineState {
        debug!("reset: called");
        let (state, discarded) = {
            let mut session = self.session.lock().await;
            let discarded = session.reset();
            self.generation.send_replace(session.generation());

            let emitter = self.events.emitter_for(session.id());
            emitter.session_reset();
            (publish(&emitter, &session), discarded)
        };

        if let Some(artifact) = discarded {
            self.discard(&artifact).await;
        }
        info!("reset: session cleared");
        state
    }

    /// Submit, poll and import one stage whose guard has already passed
    async fn run_stage<F>(
        &self,
        stage: Stage,
        generation: u64,
        emitter: &EventEmitter,
        submit: F,
    ) -> Result<PipelineState, PipelineError>
    where
        F: Future<Output = Result<String, PipelineError>>,
    {
        emitter.submission_started(stage);
        let task_id = match submit.await {
            Ok(task_id) => task_id,
            Err(e) => return self.fail_stage(stage, generation, emitter, None, e).await,
        };
        emitter.task_submitted(stage, &task_id);

        {
            let mut session = self.session.lock().await;
            if session.generation() != generation {
                return Err(stale(stage, Some(&task_id), emitter));
            }
            session.set_polling(&task_id);
            publish(emitter, &session);
        }

        let outcome = self
            .poller
            .poll_until_terminal(&task_id, stage, emitter, Some(self.generation.subscribe()))
            .await;

        let record = match outcome {
            Ok(record) => record,
            Err(PipelineError::Superseded) => return Err(stale(stage, Some(&task_id), emitter)),
            Err(e) => return self.fail_stage(stage, generation, emitter, None, e).await,
        };

        if record.status == TaskStatus::Failed {
            let error = PipelineError::RemoteTaskFailed {
                code: record.error.as_ref().and_then(|e| e.code.clone()),
                message: record.error_message().unwrap_or(NO_ERROR_MESSAGE).to_string(),
            };
            return self.fail_stage(stage, generation, emitter, Some(record), error).await;
        }

        self.complete_stage(stage, generation, emitter, record).await
    }

    /// Record a succeeded task and import its artifact
    async fn complete_stage(
        &self,
        stage: Stage,
        generation: u64,
        emitter: &EventEmitter,
        record: TaskRecord,
    ) -> Result<PipelineState, PipelineError> {
        let task_id = record.id.clone();
        let url = record.model_url().map(str::to_string);

        let (url, replaced) = {
            let mut session = self.session.lock().await;
            if session.generation() != generation {
                return Err(stale(stage, Some(&task_id), emitter));
            }
            session.record_task(record);

            let url = match url {
                Some(url) if self.import_enabled => url,
                Some(_) => {
                    debug!(%task_id, "complete_stage: import disabled");
                    session.finish();
                    return Ok(publish(emitter, &session));
                }
                None => {
                    let reason = PipelineError::MissingArtifact {
                        task_id: task_id.clone(),
                    };
                    warn!(%task_id, %stage, %reason, "complete_stage: nothing to import");
                    session.degrade(reason);
                    session.finish();
                    return Ok(publish(emitter, &session));
                }
            };

            let replaced = session.begin_import(&task_id);
            publish(emitter, &session);
            (url, replaced)
        };

        if let Some(artifact) = replaced {
            self.discard(&artifact).await;
        }

        emitter.import_started(stage, &url);
        let imported = self.importer.import(&url).await;

        let mut session = self.session.lock().await;
        if session.generation() != generation {
            drop(session);
            if let Ok(handle) = imported {
                self.importer.discard(&handle).await;
            }
            return Err(stale(stage, Some(&task_id), emitter));
        }

        match imported {
            Ok(handle) => {
                info!(%task_id, %stage, %handle, "complete_stage: artifact imported");
                emitter.import_finished(stage, true, handle.as_str());
                session.record_artifact(ImportedArtifact {
                    stage,
                    task_id,
                    url,
                    handle,
                });
            }
            Err(e) => {
                warn!(%task_id, %stage, error = %e, "complete_stage: import failed");
                emitter.import_finished(stage, false, &e.to_string());
                session.degrade(e);
            }
        }

        session.finish();
        Ok(publish(emitter, &session))
    }

    /// Record a terminal stage failure and hand the error back to the caller
    async fn fail_stage(
        &self,
        stage: Stage,
        generation: u64,
        emitter: &EventEmitter,
        record: Option<TaskRecord>,
        error: PipelineError,
    ) -> Result<PipelineState, PipelineError> {
        let mut session = self.session.lock().await;
        if session.generation() != generation {
            let task_id = record.as_ref().map(|r| r.id.as_str());
            return Err(stale(stage, task_id, emitter));
        }

        warn!(%stage, %error, "fail_stage: stage failed");
        if let Some(record) = record {
            session.record_task(record);
        }
        session.fail(stage, error.clone());
        emitter.failed(stage, &error.to_string());
        publish(emitter, &session);
        Err(error)
    }

    async fn discard(&self, artifact: &ImportedArtifact) {
        debug!(task_id = %artifact.task_id, handle = %artifact.handle, "discard: called");
        self.importer.discard(&artifact.handle).await;
    }
}

/// Emit the freshly derived state and readiness
fn publish(emitter: &EventEmitter, session: &PipelineSession) -> PipelineState {
    let state = session.state();
    let readiness = session.readiness();
    debug!(state = %state, ?readiness, "publish: state changed");
    emitter.state_changed(&state, readiness);
    state
}

fn stale(stage: Stage, task_id: Option<&str>, emitter: &EventEmitter) -> PipelineError {
    info!(%stage, ?task_id, "stale result discarded");
    emitter.stale_result_discarded(stage, task_id);
    PipelineError::Superseded
}
