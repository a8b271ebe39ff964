//! PipelineSession - the single active generation workflow
//!
//! The session stores only facts (task slots, in-flight work, the imported
//! artifact, the last failure). Pipeline state and readiness are derived from
//! those facts on demand and never stored alongside them.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use super::task::{Stage, TaskRecord};
use crate::error::PipelineError;

/// Opaque handle returned by an artifact importer
///
/// The orchestrator never looks inside; it only hands the handle back to the
/// importer when the artifact must be discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactHandle(String);

impl ArtifactHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Artifact successfully handed to the importer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedArtifact {
    pub stage: Stage,
    pub task_id: String,
    pub url: String,
    pub handle: ArtifactHandle,
}

/// What the in-flight stage is currently waiting on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InFlightPhase {
    Submitting,
    Polling { task_id: String },
    Importing { task_id: String },
}

/// The one Submit/Poll/Import cycle allowed to run at a time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    pub stage: Stage,
    pub phase: InFlightPhase,
}

/// Terminal failure of the most recent stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: PipelineError,
}

/// Derived pipeline state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    SubmittingPreview,
    PollingPreview { task_id: String },
    PreviewReady { task_id: String },
    PreviewFailed { error: PipelineError },
    SubmittingRefine,
    PollingRefine { task_id: String },
    RefineReady { task_id: String },
    RefineFailed { error: PipelineError },
    ImportingArtifact { stage: Stage, task_id: String },
    Ready { stage: Stage, task_id: String },
}

impl PipelineState {
    /// Short state name for display and events
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::SubmittingPreview => "submitting_preview",
            PipelineState::PollingPreview { .. } => "polling_preview",
            PipelineState::PreviewReady { .. } => "preview_ready",
            PipelineState::PreviewFailed { .. } => "preview_failed",
            PipelineState::SubmittingRefine => "submitting_refine",
            PipelineState::PollingRefine { .. } => "polling_refine",
            PipelineState::RefineReady { .. } => "refine_ready",
            PipelineState::RefineFailed { .. } => "refine_failed",
            PipelineState::ImportingArtifact { .. } => "importing_artifact",
            PipelineState::Ready { .. } => "ready",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PipelineState::PreviewFailed { .. } | PipelineState::RefineFailed { .. }
        )
    }

    /// The failure reason, for failure states
    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            PipelineState::PreviewFailed { error } | PipelineState::RefineFailed { error } => Some(error),
            _ => None,
        }
    }

    /// Human-readable one-line description
    pub fn describe(&self) -> String {
        match self {
            PipelineState::Idle => "Enter a prompt to generate a preview".to_string(),
            PipelineState::SubmittingPreview => "Submitting preview task...".to_string(),
            PipelineState::PollingPreview { task_id } => format!("Preview task {} running", task_id),
            PipelineState::PreviewReady { task_id } => format!("Preview task {} succeeded", task_id),
            PipelineState::PreviewFailed { error } => format!("Preview task did not succeed: {}", error),
            PipelineState::SubmittingRefine => "Submitting refine task...".to_string(),
            PipelineState::PollingRefine { task_id } => format!("Refine task {} running", task_id),
            PipelineState::RefineReady { task_id } => format!("Refine task {} succeeded", task_id),
            PipelineState::RefineFailed { error } => format!("Refine task did not succeed: {}", error),
            PipelineState::ImportingArtifact { stage, task_id } => {
                format!("Importing {} artifact from task {}", stage, task_id)
            }
            PipelineState::Ready { stage, task_id } => {
                format!("{} model from task {} is ready to place", stage, task_id)
            }
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Which caller actions are currently valid
///
/// Front ends gate every user action on this and nothing else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub can_submit_preview: bool,
    pub can_submit_refine: bool,
    pub can_place: bool,
}

/// Mutable record of the single active generation workflow
#[derive(Debug, Clone)]
pub struct PipelineSession {
    /// Session identifier (changes on every reset)
    id: String,

    /// Bumped whenever the session is overwritten; in-flight work compares
    /// against it before applying a result
    generation: u64,

    /// Last completed preview task
    preview_task: Option<TaskRecord>,

    /// Last completed refine task
    refine_task: Option<TaskRecord>,

    in_flight: Option<InFlight>,

    artifact: Option<ImportedArtifact>,

    failure: Option<StageFailure>,

    /// Why the latest succeeded stage has no placeable artifact
    degraded: Option<PipelineError>,
}

impl Default for PipelineSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            generation: 0,
            preview_task: None,
            refine_task: None,
            in_flight: None,
            artifact: None,
            failure: None,
            degraded: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn preview_task(&self) -> Option<&TaskRecord> {
        self.preview_task.as_ref()
    }

    pub fn refine_task(&self) -> Option<&TaskRecord> {
        self.refine_task.as_ref()
    }

    pub fn in_flight(&self) -> Option<&InFlight> {
        self.in_flight.as_ref()
    }

    pub fn artifact(&self) -> Option<&ImportedArtifact> {
        self.artifact.as_ref()
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    /// Why a succeeded stage stopped short of `Ready`
    ///
    /// `MissingArtifact` when the task had no model URL, `ImportFailed` when
    /// the import was attempted and failed. `None` when the stage is ready to
    /// place, still running, or import was disabled.
    pub fn degraded(&self) -> Option<&PipelineError> {
        self.degraded.as_ref()
    }

    /// The succeeded preview task, if any
    pub fn succeeded_preview(&self) -> Option<&TaskRecord> {
        self.preview_task.as_ref().filter(|t| t.is_succeeded())
    }

    /// The stage that completed most recently, failed or not
    pub fn latest_stage(&self) -> Option<Stage> {
        if let Some(failure) = &self.failure {
            return Some(failure.stage);
        }
        if self.refine_task.is_some() {
            return Some(Stage::Refine);
        }
        if self.preview_task.is_some() {
            return Some(Stage::Preview);
        }
        None
    }

    fn task_for(&self, stage: Stage) -> Option<&TaskRecord> {
        match stage {
            Stage::Preview => self.preview_task.as_ref(),
            Stage::Refine => self.refine_task.as_ref(),
        }
    }

    /// The imported artifact, if it belongs to the given stage's current task
    fn artifact_for(&self, stage: Stage) -> Option<&ImportedArtifact> {
        let task = self.task_for(stage)?;
        self.artifact
            .as_ref()
            .filter(|a| a.stage == stage && a.task_id == task.id)
    }

    /// Derive the pipeline state from the stored facts
    pub fn state(&self) -> PipelineState {
        if let Some(in_flight) = &self.in_flight {
            return match (&in_flight.phase, in_flight.stage) {
                (InFlightPhase::Submitting, Stage::Preview) => PipelineState::SubmittingPreview,
                (InFlightPhase::Submitting, Stage::Refine) => PipelineState::SubmittingRefine,
                (InFlightPhase::Polling { task_id }, Stage::Preview) => PipelineState::PollingPreview {
                    task_id: task_id.clone(),
                },
                (InFlightPhase::Polling { task_id }, Stage::Refine) => PipelineState::PollingRefine {
                    task_id: task_id.clone(),
                },
                (InFlightPhase::Importing { task_id }, stage) => PipelineState::ImportingArtifact {
                    stage,
                    task_id: task_id.clone(),
                },
            };
        }

        if let Some(failure) = &self.failure {
            let error = failure.error.clone();
            return match failure.stage {
                Stage::Preview => PipelineState::PreviewFailed { error },
                Stage::Refine => PipelineState::RefineFailed { error },
            };
        }

        match self.latest_stage() {
            Some(stage) => {
                // latest_stage only returns a stage whose slot is filled when there is no failure
                let task_id = self.task_for(stage).map(|t| t.id.clone()).unwrap_or_default();
                if self.artifact_for(stage).is_some() {
                    PipelineState::Ready { stage, task_id }
                } else {
                    match stage {
                        Stage::Preview => PipelineState::PreviewReady { task_id },
                        Stage::Refine => PipelineState::RefineReady { task_id },
                    }
                }
            }
            None => PipelineState::Idle,
        }
    }

    /// Derive which caller actions are currently valid
    pub fn readiness(&self) -> Readiness {
        let idle = self.in_flight.is_none();
        let can_place = idle
            && self.failure.is_none()
            && self
                .latest_stage()
                .and_then(|stage| {
                    self.task_for(stage)
                        .filter(|t| t.is_succeeded())
                        .and_then(|_| self.artifact_for(stage))
                })
                .is_some();

        Readiness {
            can_submit_preview: idle,
            can_submit_refine: idle && self.succeeded_preview().is_some(),
            can_place,
        }
    }

    // === Transitions (driven by the orchestrator) ===

    /// Start a new preview cycle, invalidating everything from the previous prompt
    ///
    /// Returns the artifact that must now be discarded, if any.
    pub(crate) fn begin_preview(&mut self) -> Option<ImportedArtifact> {
        debug!(generation = self.generation, "PipelineSession::begin_preview: called");
        self.generation += 1;
        self.preview_task = None;
        self.refine_task = None;
        self.failure = None;
        self.degraded = None;
        self.in_flight = Some(InFlight {
            stage: Stage::Preview,
            phase: InFlightPhase::Submitting,
        });
        self.artifact.take()
    }

    /// Start a refine cycle on top of the current preview
    pub(crate) fn begin_refine(&mut self) {
        debug!(generation = self.generation, "PipelineSession::begin_refine: called");
        self.refine_task = None;
        self.failure = None;
        self.degraded = None;
        self.in_flight = Some(InFlight {
            stage: Stage::Refine,
            phase: InFlightPhase::Submitting,
        });
    }

    pub(crate) fn set_polling(&mut self, task_id: &str) {
        if let Some(in_flight) = &mut self.in_flight {
            in_flight.phase = InFlightPhase::Polling {
                task_id: task_id.to_string(),
            };
        }
    }

    /// Store a terminal task record in its stage's slot
    pub(crate) fn record_task(&mut self, record: TaskRecord) {
        debug!(task_id = %record.id, stage = %record.stage, status = %record.status, "PipelineSession::record_task: called");
        match record.stage {
            Stage::Preview => {
                self.preview_task = Some(record);
                self.refine_task = None;
            }
            Stage::Refine => self.refine_task = Some(record),
        }
    }

    /// Move the in-flight stage to importing; returns the artifact being replaced
    pub(crate) fn begin_import(&mut self, task_id: &str) -> Option<ImportedArtifact> {
        if let Some(in_flight) = &mut self.in_flight {
            in_flight.phase = InFlightPhase::Importing {
                task_id: task_id.to_string(),
            };
        }
        self.artifact.take()
    }

    pub(crate) fn record_artifact(&mut self, artifact: ImportedArtifact) {
        self.artifact = Some(artifact);
    }

    /// Record why the stage being completed cannot be placed
    pub(crate) fn degrade(&mut self, reason: PipelineError) {
        debug!(%reason, "PipelineSession::degrade: called");
        self.degraded = Some(reason);
    }

    /// Close the in-flight cycle without a failure
    pub(crate) fn finish(&mut self) {
        self.in_flight = None;
    }

    /// Close the in-flight cycle with a terminal failure
    pub(crate) fn fail(&mut self, stage: Stage, error: PipelineError) {
        debug!(%stage, %error, "PipelineSession::fail: called");
        self.in_flight = None;
        self.failure = Some(StageFailure { stage, error });
    }

    /// Reset to an empty session; returns the artifact that must be discarded
    pub(crate) fn reset(&mut self) -> Option<ImportedArtifact> {
        debug!(generation = self.generation, "PipelineSession::reset: called");
        let generation = self.generation + 1;
        let artifact = self.artifact.take();
        *self = Self::new();
        self.generation = generation;
        artifact
    }
}
