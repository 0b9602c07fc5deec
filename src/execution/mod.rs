//! Local execution records and the reconciliation logic that drives them.
//!
//! One [`ExecutionRecord`] per remote run, held in an [`ExecutionStore`]
//! behind a per-id lock. The [`WorkflowTracker`] reconciles records with the
//! remote authority and fires the optional completion observer exactly once
//! per record.

pub mod record;
pub mod store;
pub mod tracker;

pub use record::{ExecutionRecord, ExecutionStatus, ProgressEntry};
pub use store::ExecutionStore;
pub use tracker::{CompletionObserver, PollOutcome, WorkflowTracker};
