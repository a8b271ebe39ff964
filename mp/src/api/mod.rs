//! Remote service API
//!
//! - [`Transport`] issues one HTTP request (reqwest in production, scripted in tests)
//! - [`parser`] decodes submit and status bodies into typed records
//! - [`GenerationClient`] ties both to the configured endpoints and bearer token

mod client;
pub mod parser;
pub mod transport;
mod types;

pub use client::GenerationClient;
pub use parser::{parse_error_message, parse_status_response, parse_submit_response};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, Transport, TransportError};
pub use types::{PreviewRequest, RefineRequest};
