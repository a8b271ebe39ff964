//! Generation pipeline orchestration
//!
//! [`Orchestrator`] owns one [`PipelineSession`](crate::domain::PipelineSession)
//! and runs Submit, Poll and Import for the preview and refine stages.

mod orchestrator;

pub use orchestrator::Orchestrator;
