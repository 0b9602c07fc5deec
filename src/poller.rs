//! Scheduled, fire-and-forget status checks.
//!
//! The push-style counterpart to the blocking `wait_for_completion`: a
//! coordinator tick looks up the record, reconciles it, and reschedules
//! itself until a terminal state is reached. Transient failures back off
//! linearly up to a retry ceiling, past which the record is marked failed.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::TrackerConfig;
use crate::execution::WorkflowTracker;

#[derive(Clone)]
pub struct PollingCoordinator {
    tracker: Arc<WorkflowTracker>,
    poll_interval: Duration,
    retry_base_delay: Duration,
    max_retries: u32,
}

impl PollingCoordinator {
    pub fn new(
        tracker: Arc<WorkflowTracker>,
        poll_interval: Duration,
        retry_base_delay: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            tracker,
            poll_interval,
            retry_base_delay,
            max_retries,
        }
    }

    pub fn from_config(tracker: Arc<WorkflowTracker>, config: &TrackerConfig) -> Self {
        Self::new(
            tracker,
            Duration::from_secs(config.default_poll_interval_secs),
            Duration::from_secs(config.retry.base_delay_secs),
            config.retry.max_attempts,
        )
    }

    /// Schedule the first status check for a run. Fire-and-forget: the
    /// caller gets no handle, the loop stops on its own once the record is
    /// terminal, gone, or out of retries.
    pub fn schedule(&self, workflow_id: String) {
        self.schedule_after(workflow_id, 0, self.poll_interval);
    }

    fn schedule_after(&self, workflow_id: String, retry_count: u32, delay: Duration) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            coordinator.tick(workflow_id, retry_count).await;
        });
    }

    async fn tick(&self, workflow_id: String, retry_count: u32) {
        let Some(record) = self.tracker.store().get(&workflow_id).await else {
            debug!(workflow_id = %workflow_id, "record gone, stopping status checks");
            return;
        };
        if record.is_terminal() {
            // Raced with a webhook or a blocking wait; nothing left to do.
            debug!(workflow_id = %workflow_id, "record already terminal, stopping status checks");
            return;
        }

        match self.tracker.poll_status(&workflow_id).await {
            Ok(outcome) if outcome.stop_polling() => {
                debug!(workflow_id = %workflow_id, "workflow terminal, status checks complete");
            }
            Ok(_) => {
                // Successful pass resets the retry budget.
                self.schedule_after(workflow_id, 0, self.poll_interval);
            }
            Err(err) => {
                if retry_count < self.max_retries {
                    let delay = self.retry_base_delay * (retry_count + 1);
                    warn!(
                        workflow_id = %workflow_id,
                        retry = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "status check failed, backing off"
                    );
                    self.schedule_after(workflow_id, retry_count + 1, delay);
                } else {
                    error!(
                        workflow_id = %workflow_id,
                        error = %err,
                        "status checks exhausted retries"
                    );
                    self.tracker
                        .fail(&workflow_id, format!("max retries exceeded: {err}"))
                        .await;
                }
            }
        }
    }
}
