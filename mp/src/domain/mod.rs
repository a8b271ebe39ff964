//! Domain types for the generation pipeline
//!
//! - [`TaskRecord`] - one remote job as observed through the status endpoint
//! - [`PipelineSession`] - the single active workflow, with derived state and readiness

mod session;
mod task;

pub use session::{
    ArtifactHandle, ImportedArtifact, InFlight, InFlightPhase, PipelineSession, PipelineState, Readiness, StageFailure,
};
pub use task::{ModelUrls, Stage, TaskError, TaskRecord, TaskStatus, TaskTimestamps};
