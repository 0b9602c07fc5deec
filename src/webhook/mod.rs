//! Authenticated push notifications from the remote authority.
//!
//! Inbound payloads are verified (HMAC-SHA256, constant-time compare) before
//! any state mutation, then routed by action to a registered handler.

pub mod dispatcher;
pub mod verifier;

pub use dispatcher::{ProgressHandler, WebhookDispatcher, WebhookHandler};
pub use verifier::WebhookVerifier;
