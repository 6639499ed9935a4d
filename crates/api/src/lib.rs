//! HTTP surface of the talent pipeline.
//!
//! Signed ATS webhooks come in here, as do score reads, enrichment requests
//! and tenant administration. The handlers are thin; the webhook ingress and
//! the scoring service hold the logic.

pub mod extractors;
pub mod response;
pub mod routes;
pub mod scoring;
pub mod state;
pub mod webhook;

pub use routes::router;
pub use scoring::{ScoreCacheConfig, ScoringService};
pub use state::{ApiSettings, AppState};
pub use webhook::{sign, verify_signature, WebhookConfig, WebhookIngress, WebhookOutcome};
