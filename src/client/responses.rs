use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Status names reported by the remote workflow API.
///
/// Closed set plus `Other` for names the API may add later; an unknown
/// name is neither terminal nor failed, so polling simply continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Terminated,
    TimedOut,
    Canceled,
    Other(String),
}

impl RemoteStatus {
    pub fn parse(name: &str) -> Self {
        match name {
            "PENDING" => RemoteStatus::Pending,
            "RUNNING" => RemoteStatus::Running,
            "COMPLETED" => RemoteStatus::Completed,
            "FAILED" => RemoteStatus::Failed,
            "TERMINATED" => RemoteStatus::Terminated,
            "TIMED_OUT" => RemoteStatus::TimedOut,
            "CANCELED" => RemoteStatus::Canceled,
            other => RemoteStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RemoteStatus::Pending => "PENDING",
            RemoteStatus::Running => "RUNNING",
            RemoteStatus::Completed => "COMPLETED",
            RemoteStatus::Failed => "FAILED",
            RemoteStatus::Terminated => "TERMINATED",
            RemoteStatus::TimedOut => "TIMED_OUT",
            RemoteStatus::Canceled => "CANCELED",
            RemoteStatus::Other(name) => name,
        }
    }

    pub fn is_pending(&self) -> bool {
        *self == RemoteStatus::Pending
    }

    pub fn is_running(&self) -> bool {
        *self == RemoteStatus::Running
    }

    pub fn is_completed(&self) -> bool {
        *self == RemoteStatus::Completed
    }

    /// Non-success terminal outcomes: failed, terminated, timed out, canceled.
    pub fn is_failed_family(&self) -> bool {
        matches!(
            self,
            RemoteStatus::Failed
                | RemoteStatus::Terminated
                | RemoteStatus::TimedOut
                | RemoteStatus::Canceled
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.is_completed() || self.is_failed_family()
    }
}

/// Point-in-time view of a run as reported by the remote authority.
/// Produced fresh per poll, never persisted.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub workflow_id: String,
    pub run_id: Option<String>,
    pub status: RemoteStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

// The API reports the status either nested (`{"status": {"name": ...}}`)
// or flat (`{"statusName": ...}`); both shapes are accepted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusWire {
    workflow_id: String,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    status: Option<StatusObject>,
    #[serde(default)]
    status_name: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusObject {
    name: String,
}

impl From<StatusWire> for StatusSnapshot {
    fn from(wire: StatusWire) -> Self {
        let name = wire
            .status
            .map(|s| s.name)
            .or(wire.status_name)
            .unwrap_or_default();
        StatusSnapshot {
            workflow_id: wire.workflow_id,
            run_id: wire.run_id,
            status: RemoteStatus::parse(&name),
            started_at: wire.started_at,
            completed_at: wire.completed_at,
        }
    }
}

/// Terminal input/output payload of a run.
///
/// Deliberately never persisted by the tracker: callers extract and own
/// whatever data they need, which keeps the execution table lean and avoids
/// duplicating potentially large payloads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub workflow_id: String,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub output: Option<Value>,
}
