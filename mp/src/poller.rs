//! Poller - drive one remote task to a terminal status
//!
//! Fetches the task status on a fixed interval until it is terminal, the
//! wait budget runs out, or the owning session is superseded.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::GenerationClient;
use crate::config::PollingConfig;
use crate::domain::{Stage, TaskRecord, TaskStatus};
use crate::error::PipelineError;
use crate::events::EventEmitter;

/// Fixed-interval status poller
#[derive(Clone)]
pub struct Poller {
    client: Arc<GenerationClient>,
    interval: Duration,
    max_wait: Duration,
}

impl Poller {
    pub fn new(client: Arc<GenerationClient>, interval: Duration, max_wait: Duration) -> Self {
        debug!(?interval, ?max_wait, "Poller::new: called");
        Self {
            client,
            interval,
            max_wait,
        }
    }

    pub fn from_config(client: Arc<GenerationClient>, config: &PollingConfig) -> Self {
        Self::new(client, config.interval(), config.max_wait())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Poll until the task reaches a terminal status
    ///
    /// Returns the terminal record for `SUCCEEDED` and `FAILED`. Any other
    /// terminal status is `UnexpectedStatus`. A transport failure aborts the
    /// loop with `PollFailed`. When `generation` is given, a change of its
    /// value while waiting aborts the loop with `Superseded`.
    pub async fn poll_until_terminal(
        &self,
        task_id: &str,
        stage: Stage,
        emitter: &EventEmitter,
        mut generation: Option<watch::Receiver<u64>>,
    ) -> Result<TaskRecord, PipelineError> {
        debug!(%task_id, %stage, "poll_until_terminal: called");
        let expected = generation.as_ref().map(|rx| *rx.borrow());

        let started = Instant::now();
        let mut attempt: u32 = 0;

        while started.elapsed() < self.max_wait {
            attempt += 1;

            let record = match self.client.fetch_status(task_id, stage).await {
                Ok(record) => record,
                Err(e) if e.is_transport() => {
                    warn!(%task_id, %stage, attempt, error = %e, "poll_until_terminal: status request failed");
                    return Err(PipelineError::PollFailed {
                        task_id: task_id.to_string(),
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(%task_id, %stage, attempt, error = %e, "poll_until_terminal: unreadable status");
                    return Err(e);
                }
            };

            debug!(%task_id, attempt, status = %record.status, progress = record.progress, "poll_until_terminal: observed");

            match &record.status {
                TaskStatus::Succeeded | TaskStatus::Failed => {
                    info!(%task_id, %stage, attempt, status = %record.status, "poll_until_terminal: terminal status");
                    emitter.task_finished(stage, task_id, record.status.as_wire_str());
                    return Ok(record);
                }
                TaskStatus::Other(status) => {
                    warn!(%task_id, %stage, %status, "poll_until_terminal: unexpected status");
                    emitter.task_finished(stage, task_id, status);
                    return Err(PipelineError::UnexpectedStatus(status.clone()));
                }
                TaskStatus::Pending | TaskStatus::InProgress => {
                    emitter.poll_progress(stage, task_id, record.status.as_wire_str(), record.progress, attempt);
                }
            }

            match generation.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.interval) => {}
                        changed = rx.changed() => {
                            if changed.is_err() || Some(*rx.borrow()) != expected {
                                debug!(%task_id, %stage, "poll_until_terminal: session superseded");
                                return Err(PipelineError::Superseded);
                            }
                        }
                    }
                }
                None => tokio::time::sleep(self.interval).await,
            }
        }

        warn!(%task_id, %stage, attempt, max_wait = ?self.max_wait, "poll_until_terminal: timed out");
        Err(PipelineError::Timeout(self.max_wait))
    }
}
