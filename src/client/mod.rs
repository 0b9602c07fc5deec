//! HTTP client for the remote workflow API.
//!
//! All transport failures are normalized into [`FlowtrackError::Api`] at this
//! boundary; callers never see the underlying `reqwest` error type.

pub mod responses;

use std::time::{Duration, Instant};

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::TrackerConfig;
use crate::error::{FlowtrackError, Result};
use responses::{StatusSnapshot, StatusWire, WorkflowResult};

/// Socket-level timeout for individual remote calls. This bounds a request
/// in flight, not the workflow-level wait budget.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Caller-supplied options for starting a run.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Remote task queue to start the run on; falls back to the configured
    /// queue when unset.
    pub task_queue: Option<String>,
}

/// Client for one remote workflow authority.
#[derive(Debug, Clone)]
pub struct RemoteWorkflowClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    default_task_queue: Option<String>,
}

impl RemoteWorkflowClient {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                FlowtrackError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            default_task_queue: config.task_queue.clone(),
        })
    }

    /// Start a workflow asynchronously and return the remote-assigned id.
    pub async fn start_workflow(
        &self,
        workflow_name: &str,
        input: Value,
        options: &StartOptions,
    ) -> Result<String> {
        let mut body = json!({
            "workflowName": workflow_name,
            "input": input,
        });
        if let Some(queue) = options
            .task_queue
            .as_ref()
            .or(self.default_task_queue.as_ref())
        {
            body["taskQueue"] = json!(queue);
        }

        let action = format!("start workflow {workflow_name}");
        let response = self
            .request(Method::POST, "/workflow/start")
            .json(&body)
            .send()
            .await
            .map_err(|e| FlowtrackError::transport(&action, e))?;
        let response = Self::ensure_success(&action, response).await?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| FlowtrackError::transport(&action, e))?;
        match payload.get("workflowId").and_then(Value::as_str) {
            Some(workflow_id) => {
                info!(workflow_id, workflow_name, "workflow started");
                Ok(workflow_id.to_string())
            }
            None => Err(FlowtrackError::Api {
                message: "no workflowId returned".to_string(),
                status: None,
                body: Some(payload.to_string()),
            }),
        }
    }

    /// Fetch the current status snapshot, or `None` when the remote has no
    /// record of the id.
    pub async fn workflow_status(&self, workflow_id: &str) -> Result<Option<StatusSnapshot>> {
        let action = format!("get status for workflow {workflow_id}");
        let response = self
            .request(Method::GET, &format!("/workflow/{workflow_id}/status"))
            .send()
            .await
            .map_err(|e| FlowtrackError::transport(&action, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::ensure_success(&action, response).await?;

        let wire: StatusWire = response
            .json()
            .await
            .map_err(|e| FlowtrackError::transport(&action, e))?;
        Ok(Some(wire.into()))
    }

    /// Fetch the terminal input/output payload of a run.
    pub async fn workflow_result(&self, workflow_id: &str) -> Result<WorkflowResult> {
        let action = format!("get result for workflow {workflow_id}");
        let response = self
            .request(Method::GET, &format!("/workflow/{workflow_id}/result"))
            .send()
            .await
            .map_err(|e| FlowtrackError::transport(&action, e))?;
        let response = Self::ensure_success(&action, response).await?;

        response
            .json()
            .await
            .map_err(|e| FlowtrackError::transport(&action, e))
    }

    /// Request cancellation of a run.
    ///
    /// Returns `true` on success. Cancellation is idempotent: a remote
    /// 404/410 means the run is already gone and yields `false` rather
    /// than an error.
    pub async fn cancel_workflow(&self, workflow_id: &str) -> Result<bool> {
        let action = format!("cancel workflow {workflow_id}");
        let response = self
            .request(Method::PATCH, &format!("/workflow/{workflow_id}/stop"))
            .send()
            .await
            .map_err(|e| FlowtrackError::transport(&action, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            info!(workflow_id, status = status.as_u16(), "workflow already stopped");
            return Ok(false);
        }
        Self::ensure_success(&action, response).await?;
        Ok(true)
    }

    /// Block the caller until the run completes, polling status every
    /// `poll_interval`.
    ///
    /// All-or-nothing per call: returns the result on completion, or fails
    /// with [`FlowtrackError::Timeout`] once `timeout` is exceeded,
    /// [`FlowtrackError::WorkflowNotFound`] when the remote has no record of
    /// the id, or [`FlowtrackError::WorkflowFailed`] on a failed-family
    /// terminal status. The elapsed-time check happens before each remote
    /// call, so no new request is issued past the budget.
    pub async fn wait_for_completion(
        &self,
        workflow_id: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<WorkflowResult> {
        let start = Instant::now();
        loop {
            if start.elapsed() > timeout {
                return Err(FlowtrackError::Timeout {
                    workflow_id: workflow_id.to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }

            let snapshot = self
                .workflow_status(workflow_id)
                .await?
                .ok_or_else(|| FlowtrackError::WorkflowNotFound(workflow_id.to_string()))?;

            if snapshot.status.is_completed() {
                return self.workflow_result(workflow_id).await;
            }
            if snapshot.status.is_failed_family() {
                return Err(FlowtrackError::WorkflowFailed {
                    workflow_id: workflow_id.to_string(),
                    status_name: snapshot.status.as_str().to_string(),
                });
            }

            debug!(workflow_id, status = snapshot.status.as_str(), "still waiting");
            tokio::time::sleep(poll_interval).await;
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(key) = &self.api_key {
            builder = builder.header(AUTHORIZATION, format!("Basic {key}"));
        }
        builder
    }

    async fn ensure_success(action: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(FlowtrackError::Api {
            message: format!("failed to {action}: HTTP {status}"),
            status: Some(status.as_u16()),
            body: Some(body),
        })
    }
}
