//! End-to-end tests for signed webhook ingress.
//!
//! Each test runs the real router against in-memory stores and checks both
//! the HTTP answer and what the delivery left behind (events, queue entries,
//! enrichment records).

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use integration_tests::{fixtures, setup::TestContext};
use pipeline_core::{CandidateId, EventKind};

const WEBHOOK_PATH: &str = "/v1/tenants/acme/webhooks";

fn cid(id: &str) -> CandidateId {
    CandidateId::parse(id).expect("valid candidate id")
}

/// A signed candidate webhook stores the candidate, records the event and
/// queues enrichment.
#[tokio::test]
async fn test_candidate_webhook_is_accepted_and_enqueued() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let body = fixtures::candidate_webhook("evt-1", "c1", true);

    let response = server
        .post(WEBHOOK_PATH)
        .add_header("X-Ats-Signature", &fixtures::signature(&body))
        .bytes(body.into())
        .await;

    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "accepted");
    assert_eq!(json["dedupKey"], "acme:id:evt-1");
    assert_eq!(json["enqueued"], true);

    let tenant = fixtures::tenant_id();
    let stored = ctx
        .stores
        .candidates
        .get_candidate(&tenant, &cid("c1"))
        .await
        .unwrap()
        .expect("candidate stored");
    assert!(stored.data_usage_consent);

    let entry = ctx
        .stores
        .queue
        .get_entry(&tenant, &cid("c1"))
        .await
        .unwrap()
        .expect("entry queued");
    assert_eq!(entry.priority, ctx.queue.webhook_priority);

    let events = ctx
        .stores
        .events
        .list(
            &tenant,
            EventKind::CandidateUpdated,
            Utc::now() - Duration::hours(1),
            Utc::now() + Duration::hours(1),
        )
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}

/// Replaying the same delivery is a 200 no-op.
#[tokio::test]
async fn test_replayed_webhook_is_deduplicated() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let body = fixtures::candidate_webhook("evt-1", "c1", true);
    let signature = fixtures::signature(&body);

    let first = server
        .post(WEBHOOK_PATH)
        .add_header("X-Ats-Signature", &signature)
        .bytes(body.clone().into())
        .await;
    assert_eq!(first.status_code(), StatusCode::ACCEPTED);

    let second = server
        .post(WEBHOOK_PATH)
        .add_header("X-Ats-Signature", &signature)
        .bytes(body.into())
        .await;
    assert_eq!(second.status_code(), StatusCode::OK);
    let json: serde_json::Value = second.json();
    assert_eq!(json["status"], "duplicate");

    assert_eq!(ctx.metrics.enqueued.get(), 1);
    assert_eq!(ctx.metrics.webhooks_duplicate.get(), 1);
    let stats = ctx.stores.queue.stats(&fixtures::tenant_id()).await.unwrap();
    assert_eq!(stats.pending, 1);
}

/// Bad or missing signatures are rejected before anything is stored.
#[tokio::test]
async fn test_invalid_signature_is_rejected() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let body = fixtures::candidate_webhook("evt-1", "c1", true);

    let forged = server
        .post(WEBHOOK_PATH)
        .add_header("X-Ats-Signature", "sha256=00ff")
        .bytes(body.clone().into())
        .await;
    assert_eq!(forged.status_code(), StatusCode::UNAUTHORIZED);
    let json: serde_json::Value = forged.json();
    assert_eq!(json["code"], "HOOK_001");

    let unsigned = server.post(WEBHOOK_PATH).bytes(body.clone().into()).await;
    assert_eq!(unsigned.status_code(), StatusCode::UNAUTHORIZED);

    // A rejected delivery does not burn the dedup key.
    let valid = server
        .post(WEBHOOK_PATH)
        .add_header("X-Ats-Signature", &fixtures::signature(&body))
        .bytes(body.into())
        .await;
    assert_eq!(valid.status_code(), StatusCode::ACCEPTED);
    assert_eq!(ctx.metrics.webhooks_rejected.get(), 2);
}

/// Deliveries for a tenant we do not know look like bad signatures.
#[tokio::test]
async fn test_unknown_tenant_is_rejected() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let body = fixtures::candidate_webhook("evt-1", "c1", true);

    let response = server
        .post("/v1/tenants/globex/webhooks")
        .add_header("X-Ats-Signature", &fixtures::signature(&body))
        .bytes(body.into())
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let json: serde_json::Value = response.json();
    assert_eq!(json["code"], "HOOK_001");
}

/// Bodies over the size limit are refused with 413.
#[tokio::test]
async fn test_oversized_webhook_is_rejected() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let padding = "x".repeat(pipeline_core::limits::MAX_WEBHOOK_PAYLOAD_BYTES);
    let body = fixtures::webhook(
        Some("evt-big"),
        "candidate.updated",
        Utc::now(),
        serde_json::json!({"id": "c1", "resumeText": padding}),
    );

    let response = server
        .post(WEBHOOK_PATH)
        .add_header("X-Ats-Signature", &fixtures::signature(&body))
        .bytes(body.into())
        .await;

    assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    let json: serde_json::Value = response.json();
    assert_eq!(json["code"], "VALID_003");
}

/// Event types the pipeline does not consume are acknowledged and dropped.
#[tokio::test]
async fn test_unhandled_event_type_is_ignored() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let body = fixtures::webhook(Some("evt-offer"), "offer.signed", Utc::now(), serde_json::json!({}));

    let response = server
        .post(WEBHOOK_PATH)
        .add_header("X-Ats-Signature", &fixtures::signature(&body))
        .bytes(body.into())
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "ignored");
    assert_eq!(json["eventType"], "offer.signed");
    assert_eq!(ctx.metrics.enqueued.get(), 0);
}

/// Withdrawing consent removes the enrichment from scoring.
#[tokio::test]
async fn test_consent_withdrawal_hides_enrichment() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let body = fixtures::candidate_webhook("evt-1", "c1", true);
    server
        .post(WEBHOOK_PATH)
        .add_header("X-Ats-Signature", &fixtures::signature(&body))
        .bytes(body.into())
        .await
        .assert_status(StatusCode::ACCEPTED);
    assert_eq!(ctx.drain_queue().await, 1);

    let score: serde_json::Value = server
        .get("/v1/tenants/acme/candidates/c1/score")
        .add_header("X-Actor-Id", "recruiter-1")
        .await
        .json();
    assert_eq!(score["status"], "scored");

    let withdrawal = fixtures::candidate_webhook("evt-2", "c1", false);
    server
        .post(WEBHOOK_PATH)
        .add_header("X-Ats-Signature", &fixtures::signature(&withdrawal))
        .bytes(withdrawal.into())
        .await
        .assert_status(StatusCode::ACCEPTED);

    let record = ctx
        .stores
        .candidates
        .get_enrichment(&fixtures::tenant_id(), &cid("c1"))
        .await
        .unwrap()
        .expect("record kept for audit");
    assert!(record.is_deleted());

    let score: serde_json::Value = server
        .get("/v1/tenants/acme/candidates/c1/score")
        .add_header("X-Actor-Id", "recruiter-1")
        .await
        .json();
    assert_eq!(score["status"], "not_yet_enriched");
    assert_eq!(ctx.analyzer.calls(), 1);
}
