//! DownloadImporter - fetch the model into a local cache directory

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ArtifactImporter;
use crate::api::{HttpRequest, Transport, TransportError};
use crate::config::ImportConfig;
use crate::domain::ArtifactHandle;
use crate::error::PipelineError;

const GLB_MAGIC: &[u8; 4] = b"glTF";
const GLB_VERSION: u32 = 2;
const GLB_HEADER_LEN: usize = 12;
const FALLBACK_FILE_NAME: &str = "model.glb";

/// Downloads artifacts and hands back the cached file path as the handle
///
/// Every import gets its own file, so importers sharing a cache directory
/// never overwrite or remove each other's artifacts.
pub struct DownloadImporter {
    transport: Arc<dyn Transport>,
    cache_dir: PathBuf,
}

impl DownloadImporter {
    pub fn new(transport: Arc<dyn Transport>, cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        debug!(cache_dir = %cache_dir.display(), "DownloadImporter::new: called");
        Self { transport, cache_dir }
    }

    pub fn from_config(transport: Arc<dyn Transport>, config: &ImportConfig) -> Self {
        Self::new(transport, config.cache_dir.clone())
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

#[async_trait]
impl ArtifactImporter for DownloadImporter {
    async fn import(&self, url: &str) -> Result<ArtifactHandle, PipelineError> {
        debug!(%url, "DownloadImporter::import: called");

        // Artifact URLs are pre-signed; no bearer header
        let response = self
            .transport
            .send(HttpRequest::get(url))
            .await
            .map_err(|e| match e {
                TransportError::Network(message) => {
                    PipelineError::ImportFailed(format!("download failed: {}", message))
                }
                TransportError::Protocol { status, .. } => {
                    PipelineError::ImportFailed(format!("download failed: HTTP {}", status))
                }
            })?;

        let file_name = file_name_from_url(url);
        if is_glb(&file_name) {
            validate_glb(&response.body)?;
        }

        tokio::fs::create_dir_all(&self.cache_dir).await.map_err(|e| {
            PipelineError::ImportFailed(format!(
                "failed to create cache directory {}: {}",
                self.cache_dir.display(),
                e
            ))
        })?;

        let path = self.cache_dir.join(cache_file_name(&file_name));
        tokio::fs::write(&path, &response.body)
            .await
            .map_err(|e| PipelineError::ImportFailed(format!("failed to write {}: {}", path.display(), e)))?;

        info!(path = %path.display(), bytes = response.body.len(), "DownloadImporter::import: stored artifact");
        Ok(ArtifactHandle::new(path.to_string_lossy()))
    }

    async fn discard(&self, handle: &ArtifactHandle) {
        debug!(%handle, "DownloadImporter::discard: called");
        if let Err(e) = tokio::fs::remove_file(handle.as_str()).await {
            warn!(%handle, error = %e, "DownloadImporter::discard: failed to remove artifact");
        }
    }
}

/// Last path segment of the URL, without query or fragment
fn file_name_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let after_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);

    // The first segment is the host
    match after_scheme.split_once('/') {
        Some((_, path)) => path
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")
            .map(str::to_string)
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string()),
        None => FALLBACK_FILE_NAME.to_string(),
    }
}

/// Unique cache file name that keeps the original name as a suffix
fn cache_file_name(file_name: &str) -> String {
    format!("{}-{}", Uuid::now_v7().simple(), file_name)
}

fn is_glb(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("glb"))
}

/// Check the 12-byte binary glTF header
pub fn validate_glb(bytes: &[u8]) -> Result<(), PipelineError> {
    if bytes.len() < GLB_HEADER_LEN {
        return Err(PipelineError::ImportFailed(format!(
            "not a binary glTF file: {} bytes is shorter than the header",
            bytes.len()
        )));
    }
    if &bytes[0..4] != GLB_MAGIC {
        return Err(PipelineError::ImportFailed("not a binary glTF file: bad magic".to_string()));
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != GLB_VERSION {
        return Err(PipelineError::ImportFailed(format!(
            "unsupported glTF version {}",
            version
        )));
    }

    let declared = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    if declared > bytes.len() {
        return Err(PipelineError::ImportFailed(format!(
            "truncated glTF file: header declares {} bytes, received {}",
            declared,
            bytes.len()
        )));
    }

    Ok(())
}
