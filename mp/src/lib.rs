//! meshpipe - text-to-3D generation pipeline
//!
//! Drives a remote generation service through two stages: a fast untextured
//! **preview** and an optional textured **refine** of that preview. Each stage
//! is submitted, polled to a terminal status and its model handed to an
//! artifact importer. Callers gate their actions on the derived readiness.
//!
//! # Modules
//!
//! - [`domain`] - task records, the pipeline session, derived state and readiness
//! - [`api`] - transport, wire types, response parsing and the generation client
//! - [`poller`] - fixed-interval polling to a terminal status
//! - [`import`] - artifact importer boundary and the download importer
//! - [`pipeline`] - the orchestrator
//! - [`events`] - event bus for progress and state changes
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod import;
pub mod pipeline;
pub mod poller;

pub use config::Config;
pub use domain::{PipelineSession, PipelineState, Readiness, Stage, TaskRecord, TaskStatus};
pub use error::PipelineError;
pub use pipeline::Orchestrator;
