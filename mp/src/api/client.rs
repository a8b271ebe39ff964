//! GenerationClient - submit and status calls against the remote service
//!
//! Composes the transport and parser with the configured endpoints, bearer
//! token and request defaults. Each method is exactly one HTTP request.

use std::sync::Arc;
use tracing::{debug, info};

use super::parser::{parse_error_message, parse_status_response, parse_submit_response};
use super::transport::{HttpRequest, HttpTransport, Transport, TransportError};
use super::types::{PreviewRequest, RefineRequest};
use crate::config::{Config, PreviewConfig, RefineConfig, ServiceConfig};
use crate::domain::{Stage, TaskRecord};
use crate::error::PipelineError;

/// Client for the text-to-3D submit and status endpoints
pub struct GenerationClient {
    transport: Arc<dyn Transport>,
    service: ServiceConfig,
    api_key: String,
    preview: PreviewConfig,
    refine: RefineConfig,
}

impl GenerationClient {
    /// Create a client over an explicit transport
    pub fn new(transport: Arc<dyn Transport>, service: ServiceConfig, api_key: impl Into<String>) -> Self {
        debug!(submit_url = %service.submit_url, "GenerationClient::new: called");
        Self {
            transport,
            service,
            api_key: api_key.into(),
            preview: PreviewConfig::default(),
            refine: RefineConfig::default(),
        }
    }

    /// Create a reqwest-backed client from configuration
    ///
    /// Reads the bearer token from the environment variable named in config.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        debug!("GenerationClient::from_config: called");
        let api_key = config
            .service
            .get_api_key()
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        let transport = Arc::new(HttpTransport::new(config.service.request_timeout())?);

        Ok(Self::new(transport, config.service.clone(), api_key)
            .with_preview_defaults(config.preview.clone())
            .with_refine_defaults(config.refine.clone()))
    }

    pub fn with_preview_defaults(mut self, preview: PreviewConfig) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_refine_defaults(mut self, refine: RefineConfig) -> Self {
        self.refine = refine;
        self
    }

    /// The transport this client sends through
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Submit a preview task; returns the remote task id
    pub async fn submit_preview(&self, prompt: &str) -> Result<String, PipelineError> {
        debug!(prompt_len = prompt.len(), "submit_preview: called");
        let request = PreviewRequest {
            art_style: self.preview.art_style.clone(),
            should_remesh: self.preview.should_remesh,
            target_polycount: self.preview.target_polycount,
            ..PreviewRequest::new(prompt)
        };
        let body = serde_json::to_value(&request)?;
        self.submit(Stage::Preview, &body).await
    }

    /// Submit a refine task for a succeeded preview; returns the remote task id
    pub async fn submit_refine(&self, preview_task_id: &str) -> Result<String, PipelineError> {
        debug!(%preview_task_id, "submit_refine: called");
        let request = RefineRequest {
            enable_pbr: self.refine.enable_pbr,
            ..RefineRequest::new(preview_task_id)
        };
        let body = serde_json::to_value(&request)?;
        self.submit(Stage::Refine, &body).await
    }

    /// Fetch the current status of a task
    pub async fn fetch_status(&self, task_id: &str, stage: Stage) -> Result<TaskRecord, PipelineError> {
        let url = self.service.status_url(task_id);
        debug!(%task_id, %stage, %url, "fetch_status: called");

        let request = HttpRequest::get(url).bearer(&self.api_key);
        let response = self.transport.send(request).await.map_err(transport_error)?;

        parse_status_response(&response.body, stage)
    }

    async fn submit(&self, stage: Stage, body: &serde_json::Value) -> Result<String, PipelineError> {
        let key_prefix: String = self.api_key.chars().take(5).collect();
        debug!(
            %stage,
            url = %self.service.submit_url,
            authorization = %format!("Bearer {}...", key_prefix),
            payload = %body,
            "submit: sending request"
        );

        let request = HttpRequest::post_json(&self.service.submit_url, body)?.bearer(&self.api_key);
        let response = self.transport.send(request).await.map_err(transport_error)?;
        debug!(%stage, status = response.status, body = %response.text(), "submit: raw response");

        let task_id = parse_submit_response(&response.body)?;
        info!(%stage, %task_id, "submit: task created");
        Ok(task_id)
    }
}

/// Map a transport failure to the pipeline taxonomy
fn transport_error(err: TransportError) -> PipelineError {
    match err {
        TransportError::Network(message) => PipelineError::Network(message),
        TransportError::Protocol { status, body } => PipelineError::Protocol {
            status,
            message: parse_error_message(&body),
        },
    }
}
