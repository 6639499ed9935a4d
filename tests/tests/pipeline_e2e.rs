//! End-to-end tests for the enrichment and retargeting pipeline.
//!
//! Webhooks go in through the router, the queue is drained by a real
//! enrichment worker, scores come back out through the router, and the
//! correlator sweeps what the webhooks recorded.

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use integration_tests::{fixtures, setup::TestContext};
use pipeline_core::{CandidateId, QueueStatus};
use worker::{AnalysisError, CorrelatorConfig, QueueConfig};

const WEBHOOK_PATH: &str = "/v1/tenants/acme/webhooks";
const SCORE_PATH: &str = "/v1/tenants/acme/candidates/c1/score";

async fn deliver(server: &TestServer, body: Vec<u8>) {
    server
        .post(WEBHOOK_PATH)
        .add_header("X-Ats-Signature", &fixtures::signature(&body))
        .bytes(body.into())
        .await
        .assert_status(StatusCode::ACCEPTED);
}

/// Webhook to score: the whole happy path.
#[tokio::test]
async fn test_webhook_enrich_and_score() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    deliver(&server, fixtures::candidate_webhook("evt-1", "c1", true)).await;
    assert_eq!(ctx.drain_queue().await, 1);
    assert_eq!(ctx.analyzer.calls(), 1);

    let response = server.get(SCORE_PATH).add_header("X-Actor-Id", "recruiter-1").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "scored");
    assert_eq!(json["result"]["templateId"], "general");
    assert_eq!(json["result"]["tier"], "A");
    let overall = json["result"]["overallScore"].as_f64().expect("numeric score");
    assert!((overall - 100.0).abs() < 1e-6, "overall score {overall}");

    let access = ctx
        .stores
        .access_log
        .list(&fixtures::tenant_id(), &CandidateId::parse("c1").unwrap())
        .await
        .unwrap();
    assert_eq!(access.len(), 1);
    assert_eq!(access[0].actor_id, "recruiter-1");
}

/// Score reads are audited, so an anonymous read is refused.
#[tokio::test]
async fn test_score_requires_actor() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server.get(SCORE_PATH).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let json: serde_json::Value = response.json();
    assert_eq!(json["code"], "AUTH_003");
}

/// Before the worker runs, the score reports the queue state.
#[tokio::test]
async fn test_score_before_enrichment_reports_queue_state() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let json: serde_json::Value = server
        .get(SCORE_PATH)
        .add_header("X-Actor-Id", "recruiter-1")
        .await
        .json();
    assert_eq!(json["status"], "not_yet_enriched");
    assert!(json["queue_status"].is_null());

    deliver(&server, fixtures::candidate_webhook("evt-1", "c1", true)).await;
    let json: serde_json::Value = server
        .get(SCORE_PATH)
        .add_header("X-Actor-Id", "recruiter-1")
        .await
        .json();
    assert_eq!(json["status"], "not_yet_enriched");
    assert_eq!(json["queue_status"], "pending");
}

/// A candidate without consent is never sent for analysis.
#[tokio::test]
async fn test_candidate_without_consent_fails_with_privacy_code() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    ctx.ats.add_candidate(fixtures::candidate("c9", false));

    server
        .post("/v1/tenants/acme/candidates/c9/enrichment")
        .await
        .assert_status(StatusCode::ACCEPTED);
    assert_eq!(ctx.drain_queue().await, 1);

    let entry = ctx
        .stores
        .queue
        .get_entry(&fixtures::tenant_id(), &CandidateId::parse("c9").unwrap())
        .await
        .unwrap()
        .expect("entry kept");
    assert_eq!(entry.status, QueueStatus::Failed);
    assert_eq!(entry.failure_code.as_deref(), Some("PRIV_001"));
    assert_eq!(ctx.analyzer.calls(), 0);
    assert_eq!(ctx.metrics.consent_refusals.get(), 1);
}

/// Transient analysis failures are retried until the retry budget runs out.
#[tokio::test]
async fn test_transient_failures_exhaust_retries() {
    let ctx = TestContext::with_queue(QueueConfig {
        retry_base_delay_ms: 0,
        retry_max_delay_ms: 0,
        ..QueueConfig::default()
    })
    .await;
    let server = ctx.server();
    for _ in 0..3 {
        ctx.analyzer.push(Err(AnalysisError::Transient("503".into())));
    }

    deliver(&server, fixtures::candidate_webhook("evt-1", "c1", true)).await;
    assert_eq!(ctx.drain_queue().await, 3);

    let entry = ctx
        .stores
        .queue
        .get_entry(&fixtures::tenant_id(), &CandidateId::parse("c1").unwrap())
        .await
        .unwrap()
        .expect("entry kept");
    assert_eq!(entry.status, QueueStatus::Failed);
    assert_eq!(entry.retry_count, 3);
    assert_eq!(ctx.analyzer.calls(), 3);
    assert_eq!(ctx.drain_queue().await, 0);
}

/// A transient failure followed by success completes the entry.
#[tokio::test]
async fn test_transient_failure_then_success() {
    let ctx = TestContext::with_queue(QueueConfig {
        retry_base_delay_ms: 0,
        retry_max_delay_ms: 0,
        ..QueueConfig::default()
    })
    .await;
    let server = ctx.server();
    ctx.analyzer.push(Err(AnalysisError::Transient("timeout".into())));

    deliver(&server, fixtures::candidate_webhook("evt-1", "c1", true)).await;
    assert_eq!(ctx.drain_queue().await, 2);

    let json: serde_json::Value = server
        .get(SCORE_PATH)
        .add_header("X-Actor-Id", "recruiter-1")
        .await
        .json();
    assert_eq!(json["status"], "scored");
    assert_eq!(ctx.metrics.enrichment_retried.get(), 1);
    assert_eq!(ctx.metrics.enrichment_succeeded.get(), 1);
}

/// Started applications older than the abandonment threshold with no
/// completion get exactly one retarget.
#[tokio::test]
async fn test_abandoned_application_is_retargeted_once() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let started_at = Utc::now() - Duration::hours(2);

    // s1 was abandoned.
    deliver(
        &server,
        fixtures::application_webhook("evt-s1", "apply.started", "s1", started_at, Some("grace@example.com")),
    )
    .await;
    // s2 finished.
    deliver(
        &server,
        fixtures::application_webhook("evt-s2", "apply.started", "s2", started_at, Some("alan@example.com")),
    )
    .await;
    deliver(
        &server,
        fixtures::application_webhook(
            "evt-s2-done",
            "apply.completed",
            "s2",
            started_at + Duration::minutes(10),
            None,
        ),
    )
    .await;

    let correlator = ctx.correlator(CorrelatorConfig::default());
    let report = correlator
        .sweep_tenant(&fixtures::tenant_id(), Utc::now())
        .await
        .unwrap()
        .expect("lock acquired");
    assert_eq!(report.scanned, 2);
    assert_eq!(report.completed, 1);
    assert_eq!(report.emitted, 1);
    assert_eq!(report.delivered, 1);

    let sent = ctx.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].destination, "grace@example.com");
    assert_eq!(sent[0].template, "application_reminder");

    let again = correlator
        .sweep_tenant(&fixtures::tenant_id(), Utc::now())
        .await
        .unwrap()
        .expect("lock acquired");
    assert_eq!(again.emitted, 0);
    assert_eq!(ctx.notifier.sent().len(), 1);
    assert_eq!(ctx.metrics.retargets_emitted.get(), 1);
}

/// Recent starts are left alone until the abandonment threshold passes.
#[tokio::test]
async fn test_recent_start_is_not_yet_abandoned() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    deliver(
        &server,
        fixtures::application_webhook(
            "evt-s1",
            "apply.started",
            "s1",
            Utc::now() - Duration::minutes(5),
            Some("grace@example.com"),
        ),
    )
    .await;

    let report = ctx
        .correlator(CorrelatorConfig::default())
        .sweep_tenant(&fixtures::tenant_id(), Utc::now())
        .await
        .unwrap()
        .expect("lock acquired");
    assert_eq!(report.scanned, 0);
    assert_eq!(report.emitted, 0);
    assert!(ctx.notifier.sent().is_empty());
}

/// A failed delivery is retried on the next sweep without a second retarget.
#[tokio::test]
async fn test_failed_delivery_is_retried_next_sweep() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    deliver(
        &server,
        fixtures::application_webhook(
            "evt-s1",
            "apply.started",
            "s1",
            Utc::now() - Duration::hours(1),
            Some("grace@example.com"),
        ),
    )
    .await;

    let correlator = ctx.correlator(CorrelatorConfig::default());
    ctx.notifier.set_should_fail(true);
    let first = correlator
        .sweep_tenant(&fixtures::tenant_id(), Utc::now())
        .await
        .unwrap()
        .expect("lock acquired");
    assert_eq!(first.emitted, 1);
    assert_eq!(first.delivery_failed, 1);

    ctx.notifier.set_should_fail(false);
    let second = correlator
        .sweep_tenant(&fixtures::tenant_id(), Utc::now())
        .await
        .unwrap()
        .expect("lock acquired");
    assert_eq!(second.emitted, 0);
    assert_eq!(second.delivered, 1);
    assert_eq!(ctx.notifier.sent().len(), 1);
}

/// Abandoned sessions without contact details are recorded but not sent.
#[tokio::test]
async fn test_abandoned_application_without_contact_is_skipped() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    deliver(
        &server,
        fixtures::application_webhook("evt-s1", "apply.started", "s1", Utc::now() - Duration::hours(1), None),
    )
    .await;

    let report = ctx
        .correlator(CorrelatorConfig::default())
        .sweep_tenant(&fixtures::tenant_id(), Utc::now())
        .await
        .unwrap()
        .expect("lock acquired");
    assert_eq!(report.emitted, 1);
    assert_eq!(report.skipped, 1);
    assert!(ctx.notifier.sent().is_empty());
}
