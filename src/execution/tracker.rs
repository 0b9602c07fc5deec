use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::client::responses::WorkflowResult;
use crate::client::{RemoteWorkflowClient, StartOptions};
use crate::config::TrackerConfig;
use crate::error::{FlowtrackError, Result};
use crate::execution::record::{ExecutionRecord, ExecutionStatus};
use crate::execution::store::ExecutionStore;

/// Caller-defined completion handling, registered at tracker construction.
///
/// Invoked once per record, after the transition that lands it in a terminal
/// state. Absence of a registration is a normal, checked case.
#[async_trait]
pub trait CompletionObserver: Send + Sync {
    async fn on_completion(&self, record: &ExecutionRecord);
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The record reached completed or failed; polling can stop.
    TerminalReached,
    /// No terminal state observed yet; keep polling.
    KeepPolling,
}

impl PollOutcome {
    pub fn stop_polling(self) -> bool {
        self == PollOutcome::TerminalReached
    }
}

/// Coordinates locally tracked execution records with the remote authority.
///
/// Owns the client, the record store, and an optional completion observer.
/// All record mutations go through the store's per-id lock, so the polling
/// loop and the webhook dispatcher can drive the same record concurrently.
pub struct WorkflowTracker {
    client: RemoteWorkflowClient,
    store: ExecutionStore,
    config: TrackerConfig,
    observer: Option<Arc<dyn CompletionObserver>>,
}

impl WorkflowTracker {
    pub fn new(client: RemoteWorkflowClient, store: ExecutionStore, config: TrackerConfig) -> Self {
        Self {
            client,
            store,
            config,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CompletionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn store(&self) -> &ExecutionStore {
        &self.store
    }

    pub fn client(&self) -> &RemoteWorkflowClient {
        &self.client
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Start a run remotely and begin tracking it as pending.
    pub async fn start(
        &self,
        workflow_name: &str,
        input: Value,
        options: &StartOptions,
    ) -> Result<String> {
        let workflow_id = self
            .client
            .start_workflow(workflow_name, input, options)
            .await?;
        self.store
            .insert(ExecutionRecord::new(workflow_id.clone(), workflow_name))
            .await?;
        Ok(workflow_id)
    }

    /// Reconcile the record with the remote authority.
    ///
    /// A terminal record is a no-op reporting no change. Otherwise the remote
    /// status drives the transition: completed fetches (and discards) the
    /// result and marks the record completed; a failed-family status marks it
    /// failed with the remote status name; running promotes a pending record.
    /// An absent remote record means keep polling.
    pub async fn poll_status(&self, workflow_id: &str) -> Result<PollOutcome> {
        let record = self
            .store
            .get(workflow_id)
            .await
            .ok_or_else(|| FlowtrackError::WorkflowNotFound(workflow_id.to_string()))?;
        if record.is_terminal() {
            return Ok(PollOutcome::KeepPolling);
        }

        let snapshot = match self.client.workflow_status(workflow_id).await? {
            Some(snapshot) => snapshot,
            None => {
                debug!(workflow_id, "remote has no status yet");
                return Ok(PollOutcome::KeepPolling);
            }
        };

        if snapshot.status.is_completed() {
            // Confirms the result is retrievable; the payload itself is not
            // persisted. Callers fetch output independently when they need it.
            let _ = self.client.workflow_result(workflow_id).await?;
            self.apply_terminal(workflow_id, |record| record.mark_completed())
                .await;
            Ok(PollOutcome::TerminalReached)
        } else if snapshot.status.is_failed_family() {
            let status_name = snapshot.status.as_str().to_string();
            self.apply_terminal(workflow_id, move |record| record.mark_failed(status_name))
                .await;
            Ok(PollOutcome::TerminalReached)
        } else {
            if snapshot.status.is_running() && record.status == ExecutionStatus::Pending {
                self.store
                    .update(workflow_id, |record| {
                        record.mark_running();
                    })
                    .await;
                debug!(workflow_id, "workflow observed running");
            }
            Ok(PollOutcome::KeepPolling)
        }
    }

    /// Best-effort cancellation.
    ///
    /// Already-terminal records are a success no-op with no remote call. A
    /// remote error does not propagate: the record is still marked failed
    /// (with the error text embedded) and `false` is returned, so a cancel
    /// attempt never leaves a record stuck active.
    pub async fn cancel(&self, workflow_id: &str) -> Result<bool> {
        let record = self
            .store
            .get(workflow_id)
            .await
            .ok_or_else(|| FlowtrackError::WorkflowNotFound(workflow_id.to_string()))?;
        if record.is_terminal() {
            return Ok(true);
        }

        match self.client.cancel_workflow(workflow_id).await {
            Ok(true) => {
                self.apply_terminal(workflow_id, |record| record.mark_failed("cancelled by user"))
                    .await;
                info!(workflow_id, "workflow cancelled");
                Ok(true)
            }
            Ok(false) => {
                self.apply_terminal(workflow_id, |record| {
                    record.mark_failed("cancelled, not found remotely")
                })
                .await;
                warn!(workflow_id, "workflow not found remotely, cancelled locally");
                Ok(true)
            }
            Err(err) => {
                error!(workflow_id, error = %err, "remote cancellation failed");
                self.apply_terminal(workflow_id, |record| {
                    record.mark_failed(format!("cancellation failed: {err}"))
                })
                .await;
                Ok(false)
            }
        }
    }

    /// Block until the run completes, then persist the terminal state.
    ///
    /// Delegates to the client's polling loop without touching the record
    /// between polls. On failure or timeout the record is marked failed
    /// before the original error is re-raised, so local state is never stale
    /// relative to a surfaced error.
    pub async fn wait_for_completion(
        &self,
        workflow_id: &str,
        poll_interval: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<WorkflowResult> {
        let poll_interval = poll_interval
            .unwrap_or_else(|| Duration::from_secs(self.config.default_poll_interval_secs));
        let timeout =
            timeout.unwrap_or_else(|| Duration::from_secs(self.config.default_timeout_secs));

        match self
            .client
            .wait_for_completion(workflow_id, poll_interval, timeout)
            .await
        {
            Ok(result) => {
                self.apply_terminal(workflow_id, |record| record.mark_completed())
                    .await;
                Ok(result)
            }
            Err(err) => {
                match &err {
                    FlowtrackError::WorkflowFailed { status_name, .. } => {
                        let reason = status_name.clone();
                        self.apply_terminal(workflow_id, move |record| record.mark_failed(reason))
                            .await;
                    }
                    FlowtrackError::Timeout { .. } => {
                        self.apply_terminal(workflow_id, |record| record.mark_failed("timed_out"))
                            .await;
                    }
                    _ => {}
                }
                Err(err)
            }
        }
    }

    /// Fetch the run's output without persisting it.
    pub async fn fetch_output(&self, workflow_id: &str) -> Result<Option<Value>> {
        let result = self.client.workflow_result(workflow_id).await?;
        Ok(result.output)
    }

    /// Record a progress event pushed by the remote authority.
    pub async fn append_progress(
        &self,
        workflow_id: &str,
        name: impl Into<String>,
        extra_info: Option<String>,
    ) -> bool {
        let max_entries = self.config.max_progress_entries;
        let name = name.into();
        self.store
            .update(workflow_id, move |record| {
                record.append_progress(name, extra_info, max_entries)
            })
            .await
            .unwrap_or(false)
    }

    /// Mark a record failed outside the reconciliation path (e.g. when the
    /// polling loop exhausts its retries).
    pub(crate) async fn fail(&self, workflow_id: &str, reason: String) {
        self.apply_terminal(workflow_id, move |record| record.mark_failed(reason))
            .await;
    }

    /// Apply a terminal transition under the record lock and, when this call
    /// performed the transition, notify the observer. The transition flag is
    /// true at most once per record, which makes the callback exactly-once.
    async fn apply_terminal<F>(&self, workflow_id: &str, transition: F)
    where
        F: FnOnce(&mut ExecutionRecord) -> bool,
    {
        let outcome = self
            .store
            .update(workflow_id, |record| {
                let transitioned = transition(record);
                (transitioned, record.clone())
            })
            .await;

        if let Some((true, record)) = outcome {
            info!(
                workflow_id,
                status = ?record.status,
                "workflow reached terminal state"
            );
            if let Some(observer) = &self.observer {
                observer.on_completion(&record).await;
            }
        }
    }
}
