use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Initialize structured logging for the binary.
///
/// JSON output with span context, filtered by `RUST_LOG` (info by default).
pub fn init_telemetry() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true),
        )
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("flowtrack telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking related operations in logs.
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping one workflow-tracking operation.
pub fn create_tracking_span(operation: &str, workflow_id: Option<&str>) -> tracing::Span {
    tracing::info_span!(
        "workflow_tracking",
        operation = operation,
        workflow.id = workflow_id,
    )
}
