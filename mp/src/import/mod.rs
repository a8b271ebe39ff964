//! Artifact import boundary
//!
//! The orchestrator hands a validated model URL to an [`ArtifactImporter`]
//! and keeps the returned handle without looking inside it.

mod download;

pub use download::{DownloadImporter, validate_glb};

use async_trait::async_trait;

use crate::domain::ArtifactHandle;
use crate::error::PipelineError;

/// Consumer of generated model URLs
#[async_trait]
pub trait ArtifactImporter: Send + Sync {
    /// Import the model at `url`; errors must be `PipelineError::ImportFailed`
    async fn import(&self, url: &str) -> Result<ArtifactHandle, PipelineError>;

    /// Release a previously imported artifact
    async fn discard(&self, handle: &ArtifactHandle);
}
