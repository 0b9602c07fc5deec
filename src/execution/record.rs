use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Locally persisted status of a tracked run.
///
/// Only ever moves pending -> running -> {completed, failed}; a run may also
/// jump straight from pending to a terminal state when completion is
/// observed before any running transition. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

/// One progress event pushed by the remote authority, newest first in the
/// record's progress list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub name: String,
    pub extra_info: Option<String>,
    pub at: DateTime<Utc>,
}

/// Local state for one remote workflow run, keyed by the remote-assigned
/// `workflow_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub workflow_id: String,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Newest-first, bounded by the configured maximum.
    pub progress: Vec<ProgressEntry>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every store write; lets snapshots detect staleness.
    pub version: u64,
}

impl ExecutionRecord {
    pub fn new(workflow_id: impl Into<String>, workflow_name: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            workflow_name: workflow_name.into(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            error_message: None,
            progress: Vec::new(),
            created_at: Utc::now(),
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Transition pending -> running. A running record is refreshed as a
    /// no-op; terminal records are untouched. `started_at` is set only once.
    ///
    /// Returns whether the status changed.
    pub fn mark_running(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        let changed = self.status != ExecutionStatus::Running;
        self.status = ExecutionStatus::Running;
        changed
    }

    /// Transition any non-terminal state to completed.
    ///
    /// Returns true only when this call performed the transition, which is
    /// what guarantees the completion callback fires exactly once.
    pub fn mark_completed(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
        true
    }

    /// Transition any non-terminal state to failed, recording the reason.
    ///
    /// Returns true only when this call performed the transition.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(reason.into());
        true
    }

    /// Prepend a progress entry, truncate to `max_entries`, and promote a
    /// pending record to running (progress implies the run has started).
    ///
    /// No-op on terminal records; returns whether the entry was recorded.
    pub fn append_progress(
        &mut self,
        name: impl Into<String>,
        extra_info: Option<String>,
        max_entries: usize,
    ) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.progress.insert(
            0,
            ProgressEntry {
                name: name.into(),
                extra_info,
                at: Utc::now(),
            },
        );
        self.progress.truncate(max_entries);
        self.mark_running();
        true
    }

    /// Empty the progress list. Only legal once terminal; keeps long-lived
    /// records lean after the run is done.
    pub fn clear_progress(&mut self) -> bool {
        if !self.is_terminal() {
            return false;
        }
        self.progress.clear();
        true
    }
}
