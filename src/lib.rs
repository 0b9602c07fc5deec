// Flowtrack - client-side lifecycle tracking for remote workflow runs
// This exposes the core components for testing and integration

pub mod client;
pub mod config;
pub mod error;
pub mod execution;
pub mod poller;
pub mod telemetry;
pub mod webhook;

// Re-export key types for easy access
pub use client::responses::{RemoteStatus, StatusSnapshot, WorkflowResult};
pub use client::{RemoteWorkflowClient, StartOptions};
pub use config::{RetryConfig, TrackerConfig};
pub use error::{FlowtrackError, Result};
pub use execution::{
    CompletionObserver, ExecutionRecord, ExecutionStatus, ExecutionStore, PollOutcome,
    ProgressEntry, WorkflowTracker,
};
pub use poller::PollingCoordinator;
pub use telemetry::{generate_correlation_id, init_telemetry};
pub use webhook::{ProgressHandler, WebhookDispatcher, WebhookHandler, WebhookVerifier};
