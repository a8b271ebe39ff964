//! Transport - one HTTP request, no retries
//!
//! The transport reports a coarse outcome only: a response body, a network
//! failure, or a protocol failure (status >= 400, body kept so callers can
//! pull an error message out of it). Repeated requests are a poller decision.

use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::error::PipelineError;

/// HTTP method used by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// A single outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// POST with a JSON body and matching content type
    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Result<Self, PipelineError> {
        let bytes = serde_json::to_vec(body).map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            method: Method::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(bytes),
        })
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token))
    }

    /// Look up a header value (case-insensitive name match)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A successful (status < 400) response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Coarse transport failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection could not be established or was aborted mid-flight
    #[error("Network error: {0}")]
    Network(String),

    /// A response arrived with a failure status
    #[error("HTTP {status}")]
    Protocol { status: u16, body: Vec<u8> },
}

/// Issues a single HTTP request
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    /// Create a transport; `None` keeps reqwest's default (no per-request cap)
    pub fn new(timeout: Option<Duration>) -> Result<Self, PipelineError> {
        debug!(?timeout, "HttpTransport::new: called");
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!(method = %request.method, url = %request.url, "HttpTransport::send: called");
        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            debug!(error = %e, "HttpTransport::send: network error");
            TransportError::Network(e.to_string())
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| {
                debug!(error = %e, "HttpTransport::send: body aborted");
                TransportError::Network(e.to_string())
            })?
            .to_vec();

        if status >= 400 {
            debug!(status, "HttpTransport::send: protocol error");
            return Err(TransportError::Protocol { status, body });
        }

        debug!(status, bytes = body.len(), "HttpTransport::send: success");
        Ok(HttpResponse { status, body })
    }
}


#[cfg(test)]
mod tests {
    use super::mock::ScriptedTransport;
    use super::*;

    #[tokio::test]
    async fn test_scripted_transport_replays_in_order() {
        let transport = ScriptedTransport::json(&[r#"{"a":1}"#, r#"{"a":2}"#]);

        let first = transport.send(HttpRequest::get("http://x/1")).await.unwrap();
        let second = transport.send(HttpRequest::get("http://x/2")).await.unwrap();
        let third = transport.send(HttpRequest::get("http://x/3")).await;

        assert_eq!(first.text(), r#"{"a":1}"#);
        assert_eq!(second.text(), r#"{"a":2}"#);
        assert!(matches!(third, Err(TransportError::Network(_))));
        assert_eq!(transport.call_count(), 3);
        assert_eq!(transport.requests()[1].url, "http://x/2");
    }

    #[tokio::test]
    async fn test_scripted_transport_repeats_last() {
        let transport = ScriptedTransport::json(&[r#"{"status":"PENDING"}"#]).repeating();
        for _ in 0..5 {
            let response = transport.send(HttpRequest::get("http://x")).await.unwrap();
            assert!(response.text().contains("PENDING"));
        }
        assert_eq!(transport.call_count(), 5);
    }

    #[test]
    fn test_post_json_sets_content_type() {
        let request = HttpRequest::post_json("http://x", &serde_json::json!({"mode": "preview"})).unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.body.as_deref(), Some(br#"{"mode":"preview"}"#.as_slice()));
    }

    #[test]
    fn test_bearer_header() {
        let request = HttpRequest::get("http://x").bearer("secret");
        assert_eq!(request.header("Authorization"), Some("Bearer secret"));
    }

    #[test]
    fn test_protocol_error_keeps_body() {
        let err = TransportError::Protocol {
            status: 402,
            body: br#"{"message":"Insufficient funds"}"#.to_vec(),
        };
        assert_eq!(err.to_string(), "HTTP 402");
        if let TransportError::Protocol { body, .. } = err {
            assert!(String::from_utf8_lossy(&body).contains("Insufficient"));
        }
    }
}
