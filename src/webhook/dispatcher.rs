use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{FlowtrackError, Result};
use crate::execution::WorkflowTracker;
use crate::webhook::verifier::WebhookVerifier;

/// Processes one normalized webhook payload for its registered action.
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    async fn handle(&self, payload: &Map<String, Value>);
}

/// Routes inbound webhooks to per-action handlers.
///
/// Payloads arrive as raw JSON text or an already-decoded value and are
/// normalized into a string-keyed map before routing. An unknown action or a
/// workflow id the local system never created is a silent no-op: webhooks
/// may legitimately arrive for runs this process does not track.
#[derive(Default)]
pub struct WebhookDispatcher {
    handlers: HashMap<String, Arc<dyn WebhookHandler>>,
}

impl WebhookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher preloaded with the progress handler, the one action the
    /// remote authority currently pushes.
    pub fn with_progress_handler(tracker: Arc<WorkflowTracker>) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(
            ProgressHandler::ACTION,
            Arc::new(ProgressHandler::new(tracker)),
        );
        dispatcher
    }

    pub fn register(&mut self, action: impl Into<String>, handler: Arc<dyn WebhookHandler>) {
        self.handlers.insert(action.into(), handler);
    }

    /// Verify the signature over the raw payload bytes, then dispatch.
    /// Verification failure rejects the webhook before any state mutation.
    pub async fn handle_signed(
        &self,
        verifier: &WebhookVerifier,
        raw_payload: &[u8],
        signature_hex: &str,
    ) -> Result<()> {
        verifier.verify(raw_payload, signature_hex)?;
        self.dispatch_text(std::str::from_utf8(raw_payload).map_err(|e| {
            FlowtrackError::InvalidPayload(format!("payload is not valid UTF-8: {e}"))
        })?)
        .await
    }

    /// Parse raw JSON text and dispatch.
    pub async fn dispatch_text(&self, raw: &str) -> Result<()> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| FlowtrackError::InvalidPayload(e.to_string()))?;
        self.dispatch(value).await
    }

    /// Normalize an already-decoded payload and route it by `action`.
    pub async fn dispatch(&self, payload: Value) -> Result<()> {
        let normalized = normalize(payload)?;

        let Some(action) = normalized.get("action").and_then(Value::as_str) else {
            debug!("webhook payload has no action, ignoring");
            return Ok(());
        };

        match self.handlers.get(action) {
            Some(handler) => handler.handle(&normalized).await,
            None => debug!(action, "no handler registered for action, ignoring"),
        }
        Ok(())
    }
}

/// Reduce a payload of unknown shape to a canonical string-keyed map.
fn normalize(payload: Value) -> Result<Map<String, Value>> {
    match payload {
        Value::Object(map) => Ok(map),
        other => Err(FlowtrackError::InvalidPayload(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Handles `workflow_progress` events by appending to the record's progress
/// list. Expected payload:
///
/// ```json
/// {
///   "action": "workflow_progress",
///   "workflowId": "wf-123",
///   "name": "Processing step 1",
///   "extraInfo": "Optional details"
/// }
/// ```
pub struct ProgressHandler {
    tracker: Arc<WorkflowTracker>,
}

impl ProgressHandler {
    pub const ACTION: &'static str = "workflow_progress";

    pub fn new(tracker: Arc<WorkflowTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl WebhookHandler for ProgressHandler {
    async fn handle(&self, payload: &Map<String, Value>) {
        let Some(workflow_id) = payload.get("workflowId").and_then(Value::as_str) else {
            debug!("progress webhook has no workflowId, ignoring");
            return;
        };
        let Some(record) = self.tracker.store().get(workflow_id).await else {
            debug!(workflow_id, "progress webhook for unknown workflow, ignoring");
            return;
        };
        if record.is_terminal() {
            debug!(workflow_id, "progress webhook for terminal workflow, ignoring");
            return;
        }

        let name = payload
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let extra_info = payload
            .get("extraInfo")
            .and_then(Value::as_str)
            .map(String::from);

        self.tracker
            .append_progress(workflow_id, name, extra_info)
            .await;
    }
}
