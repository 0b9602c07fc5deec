//! End-to-end lifecycle tests: reconciliation, cancellation, the scheduled
//! polling loop, and webhook-driven progress, all against a wiremock remote.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flowtrack::{
    CompletionObserver, ExecutionRecord, ExecutionStatus, ExecutionStore, FlowtrackError,
    PollOutcome, PollingCoordinator, RemoteWorkflowClient, StartOptions, TrackerConfig,
    WebhookDispatcher, WebhookVerifier, WorkflowTracker,
};

#[derive(Default)]
struct CountingObserver {
    completions: AtomicUsize,
}

#[async_trait]
impl CompletionObserver for CountingObserver {
    async fn on_completion(&self, _record: &ExecutionRecord) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }
}

fn test_config(api_url: String) -> TrackerConfig {
    TrackerConfig {
        api_url,
        api_key: Some("test-key".to_string()),
        ..TrackerConfig::default()
    }
}

fn tracker_with_observer(
    server: &MockServer,
) -> (Arc<WorkflowTracker>, Arc<CountingObserver>) {
    let config = test_config(server.uri());
    let client = RemoteWorkflowClient::new(&config).unwrap();
    let observer = Arc::new(CountingObserver::default());
    let tracker = Arc::new(
        WorkflowTracker::new(client, ExecutionStore::new(), config)
            .with_observer(observer.clone()),
    );
    (tracker, observer)
}

async fn mount_status(server: &MockServer, workflow_id: &str, status: &str, times: Option<u64>) {
    let mut mock = Mock::given(method("GET"))
        .and(path(format!("/workflow/{workflow_id}/status")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workflowId": workflow_id,
            "status": { "name": status }
        })));
    if let Some(n) = times {
        mock = mock.up_to_n_times(n);
    }
    mock.mount(server).await;
}

#[tokio::test]
async fn reconciliation_drives_pending_to_completed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/workflow/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "workflowId": "wf-1" })))
        .mount(&server)
        .await;
    mount_status(&server, "wf-1", "RUNNING", Some(1)).await;
    mount_status(&server, "wf-1", "COMPLETED", None).await;
    Mock::given(method("GET"))
        .and(path("/workflow/wf-1/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workflowId": "wf-1",
            "output": { "summary": "done" }
        })))
        .mount(&server)
        .await;

    let (tracker, observer) = tracker_with_observer(&server);
    let workflow_id = tracker
        .start("summarize", json!({ "text": "..." }), &StartOptions::default())
        .await
        .unwrap();
    assert_eq!(workflow_id, "wf-1");
    let record = tracker.store().get("wf-1").await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Pending);

    // First poll observes RUNNING: promote, keep polling.
    let outcome = tracker.poll_status("wf-1").await.unwrap();
    assert_eq!(outcome, PollOutcome::KeepPolling);
    let record = tracker.store().get("wf-1").await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Running);
    let started_at = record.started_at.expect("started_at set on first running");

    // Second poll observes COMPLETED: terminal, callback fires.
    let outcome = tracker.poll_status("wf-1").await.unwrap();
    assert_eq!(outcome, PollOutcome::TerminalReached);
    let record = tracker.store().get("wf-1").await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.started_at, Some(started_at));
    assert!(record.completed_at.is_some());
    assert_eq!(observer.completions.load(Ordering::SeqCst), 1);

    // Terminal records are a no-op; the callback never fires twice.
    let outcome = tracker.poll_status("wf-1").await.unwrap();
    assert_eq!(outcome, PollOutcome::KeepPolling);
    assert_eq!(observer.completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reconciliation_marks_failed_family_statuses() {
    let server = MockServer::start().await;
    mount_status(&server, "wf-1", "TIMED_OUT", None).await;

    let (tracker, observer) = tracker_with_observer(&server);
    tracker
        .store()
        .insert(ExecutionRecord::new("wf-1", "summarize"))
        .await
        .unwrap();

    let outcome = tracker.poll_status("wf-1").await.unwrap();
    assert_eq!(outcome, PollOutcome::TerminalReached);
    let record = tracker.store().get("wf-1").await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("TIMED_OUT"));
    assert_eq!(observer.completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reconciliation_keeps_polling_when_remote_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/workflow/wf-1/status"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (tracker, _observer) = tracker_with_observer(&server);
    tracker
        .store()
        .insert(ExecutionRecord::new("wf-1", "summarize"))
        .await
        .unwrap();

    let outcome = tracker.poll_status("wf-1").await.unwrap();
    assert_eq!(outcome, PollOutcome::KeepPolling);
    let record = tracker.store().get("wf-1").await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Pending);
}

#[tokio::test]
async fn cancel_on_terminal_record_makes_no_remote_call() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/workflow/wf-1/stop"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (tracker, _observer) = tracker_with_observer(&server);
    tracker
        .store()
        .insert(ExecutionRecord::new("wf-1", "summarize"))
        .await
        .unwrap();
    tracker
        .store()
        .update("wf-1", |record| {
            record.mark_completed();
        })
        .await;
    let before = tracker.store().get("wf-1").await.unwrap();

    assert!(tracker.cancel("wf-1").await.unwrap());
    let after = tracker.store().get("wf-1").await.unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after.completed_at, before.completed_at);
}

#[tokio::test]
async fn cancel_marks_failed_as_cancelled_by_user() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/workflow/wf-1/stop"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (tracker, observer) = tracker_with_observer(&server);
    tracker
        .store()
        .insert(ExecutionRecord::new("wf-1", "summarize"))
        .await
        .unwrap();

    assert!(tracker.cancel("wf-1").await.unwrap());
    let record = tracker.store().get("wf-1").await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("cancelled by user"));
    assert_eq!(observer.completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancel_on_remote_404_distinguishes_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/workflow/wf-1/stop"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (tracker, _observer) = tracker_with_observer(&server);
    tracker
        .store()
        .insert(ExecutionRecord::new("wf-1", "summarize"))
        .await
        .unwrap();

    assert!(tracker.cancel("wf-1").await.unwrap());
    let record = tracker.store().get("wf-1").await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(
        record.error_message.as_deref(),
        Some("cancelled, not found remotely")
    );
}

#[tokio::test]
async fn cancel_swallows_remote_errors_but_still_terminates_locally() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/workflow/wf-1/stop"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let (tracker, _observer) = tracker_with_observer(&server);
    tracker
        .store()
        .insert(ExecutionRecord::new("wf-1", "summarize"))
        .await
        .unwrap();

    // Best-effort: the remote error is reported via the boolean, and the
    // record still ends up terminal.
    assert!(!tracker.cancel("wf-1").await.unwrap());
    let record = tracker.store().get("wf-1").await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Failed);
    let reason = record.error_message.unwrap();
    assert!(reason.starts_with("cancellation failed:"), "reason: {reason}");
}

#[tokio::test]
async fn wait_for_completion_persists_timeout_before_reraising() {
    let server = MockServer::start().await;
    mount_status(&server, "wf-1", "RUNNING", None).await;

    let (tracker, observer) = tracker_with_observer(&server);
    tracker
        .store()
        .insert(ExecutionRecord::new("wf-1", "summarize"))
        .await
        .unwrap();

    let err = tracker
        .wait_for_completion(
            "wf-1",
            Some(Duration::from_millis(30)),
            Some(Duration::from_millis(120)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlowtrackError::Timeout { .. }));
    let record = tracker.store().get("wf-1").await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("timed_out"));
    assert_eq!(observer.completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn wait_for_completion_persists_remote_failure_before_reraising() {
    let server = MockServer::start().await;
    mount_status(&server, "wf-1", "CANCELED", None).await;

    let (tracker, _observer) = tracker_with_observer(&server);
    tracker
        .store()
        .insert(ExecutionRecord::new("wf-1", "summarize"))
        .await
        .unwrap();

    let err = tracker
        .wait_for_completion("wf-1", Some(Duration::from_millis(20)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowtrackError::WorkflowFailed { .. }));
    let record = tracker.store().get("wf-1").await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("CANCELED"));
}

#[tokio::test]
async fn wait_for_completion_marks_completed_and_returns_output() {
    let server = MockServer::start().await;
    mount_status(&server, "wf-1", "COMPLETED", None).await;
    Mock::given(method("GET"))
        .and(path("/workflow/wf-1/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workflowId": "wf-1",
            "output": { "summary": "done" }
        })))
        .mount(&server)
        .await;

    let (tracker, observer) = tracker_with_observer(&server);
    tracker
        .store()
        .insert(ExecutionRecord::new("wf-1", "summarize"))
        .await
        .unwrap();

    let result = tracker
        .wait_for_completion("wf-1", Some(Duration::from_millis(20)), None)
        .await
        .unwrap();
    assert_eq!(result.output, Some(json!({ "summary": "done" })));
    let record = tracker.store().get("wf-1").await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(observer.completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn polling_coordinator_runs_to_terminal() {
    let server = MockServer::start().await;
    mount_status(&server, "wf-1", "RUNNING", Some(1)).await;
    mount_status(&server, "wf-1", "COMPLETED", None).await;
    Mock::given(method("GET"))
        .and(path("/workflow/wf-1/result"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "workflowId": "wf-1", "output": null })),
        )
        .mount(&server)
        .await;

    let (tracker, observer) = tracker_with_observer(&server);
    tracker
        .store()
        .insert(ExecutionRecord::new("wf-1", "summarize"))
        .await
        .unwrap();

    let coordinator = PollingCoordinator::new(
        tracker.clone(),
        Duration::from_millis(20),
        Duration::from_millis(10),
        3,
    );
    coordinator.schedule("wf-1".to_string());

    tokio::time::sleep(Duration::from_millis(400)).await;
    let record = tracker.store().get("wf-1").await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(observer.completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn polling_coordinator_fails_record_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/workflow/wf-1/status"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (tracker, observer) = tracker_with_observer(&server);
    tracker
        .store()
        .insert(ExecutionRecord::new("wf-1", "summarize"))
        .await
        .unwrap();

    let coordinator = PollingCoordinator::new(
        tracker.clone(),
        Duration::from_millis(10),
        Duration::from_millis(10),
        2,
    );
    coordinator.schedule("wf-1".to_string());

    tokio::time::sleep(Duration::from_millis(500)).await;
    let record = tracker.store().get("wf-1").await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Failed);
    let reason = record.error_message.unwrap();
    assert!(reason.starts_with("max retries exceeded"), "reason: {reason}");
    assert_eq!(observer.completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn polling_coordinator_stops_silently_for_unknown_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/workflow/wf-missing/status"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (tracker, _observer) = tracker_with_observer(&server);
    let coordinator = PollingCoordinator::new(
        tracker,
        Duration::from_millis(10),
        Duration::from_millis(10),
        2,
    );
    coordinator.schedule("wf-missing".to_string());
    tokio::time::sleep(Duration::from_millis(100)).await;
    // MockServer verifies on drop that no status call was made.
}

#[tokio::test]
async fn signed_progress_webhook_updates_record() {
    let server = MockServer::start().await;
    let (tracker, _observer) = tracker_with_observer(&server);
    tracker
        .store()
        .insert(ExecutionRecord::new("wf-1", "summarize"))
        .await
        .unwrap();

    let verifier = WebhookVerifier::new("s3cret").unwrap();
    let dispatcher = WebhookDispatcher::with_progress_handler(tracker.clone());

    let payload =
        br#"{"action":"workflow_progress","workflowId":"wf-1","name":"chunking","extraInfo":"3/10"}"#;
    let signature = {
        use hmac::{Hmac, Mac};
        let mut mac = Hmac::<sha2::Sha256>::new_from_slice(b"s3cret").unwrap();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    };

    dispatcher
        .handle_signed(&verifier, payload, &signature)
        .await
        .unwrap();

    let record = tracker.store().get("wf-1").await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Running);
    assert_eq!(record.progress[0].name, "chunking");
    assert_eq!(record.progress[0].extra_info.as_deref(), Some("3/10"));
}

#[tokio::test]
async fn tampered_webhook_is_rejected_before_any_mutation() {
    let server = MockServer::start().await;
    let (tracker, _observer) = tracker_with_observer(&server);
    tracker
        .store()
        .insert(ExecutionRecord::new("wf-1", "summarize"))
        .await
        .unwrap();

    let verifier = WebhookVerifier::new("s3cret").unwrap();
    let dispatcher = WebhookDispatcher::with_progress_handler(tracker.clone());

    let payload = br#"{"action":"workflow_progress","workflowId":"wf-1","name":"chunking"}"#;
    let err = dispatcher
        .handle_signed(&verifier, payload, "deadbeef")
        .await
        .unwrap_err();
    assert!(matches!(err, FlowtrackError::Verification));

    let record = tracker.store().get("wf-1").await.unwrap();
    assert!(record.progress.is_empty());
    assert_eq!(record.status, ExecutionStatus::Pending);
}
