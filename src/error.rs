use thiserror::Error;

/// Errors surfaced by the workflow tracking library.
///
/// Transport failures are normalized into `Api` at the client boundary;
/// callers never see a `reqwest::Error`.
#[derive(Debug, Error)]
pub enum FlowtrackError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{message}")]
    Api {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    #[error("workflow {workflow_id} timed out after {timeout_secs} seconds")]
    Timeout {
        workflow_id: String,
        timeout_secs: u64,
    },

    #[error("workflow {0} not found")]
    WorkflowNotFound(String),

    #[error("workflow {workflow_id} failed with status: {status_name}")]
    WorkflowFailed {
        workflow_id: String,
        status_name: String,
    },

    #[error("workflow {0} is already tracked")]
    DuplicateWorkflow(String),

    #[error("webhook secret is required")]
    MissingSecret,

    #[error("invalid webhook signature")]
    Verification,

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
}

impl FlowtrackError {
    /// Normalize a transport failure into the boundary `Api` error.
    pub(crate) fn transport(action: &str, err: reqwest::Error) -> Self {
        FlowtrackError::Api {
            message: format!("failed to {action}: {err}"),
            status: err.status().map(|s| s.as_u16()),
            body: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowtrackError>;
