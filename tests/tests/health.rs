//! Tests for health check and metrics endpoints.

use axum::http::StatusCode;
use integration_tests::{fixtures, setup::TestContext};

/// Test /health endpoint returns proper structure
#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new().await;
    ctx.health.store.record(true, "");

    let response = ctx.server().get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert!(body.get("status").is_some(), "Response should have 'status' field");
    let components = body["components"].as_array().expect("components array");
    let names: Vec<&str> = components.iter().filter_map(|c| c["name"].as_str()).collect();
    assert_eq!(names, ["store", "ai", "ats"]);
}

/// The store decides whether the service can serve at all.
#[tokio::test]
async fn test_health_status_follows_components() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "unhealthy");

    ctx.health.store.record(true, "");
    let body: serde_json::Value = server.get("/health").await.json();
    assert_eq!(body["status"], "degraded");

    ctx.health.ai.record(true, "");
    ctx.health.ats.record(true, "");
    let body: serde_json::Value = server.get("/health").await.json();
    assert_eq!(body["status"], "healthy");

    ctx.health.ats.record(false, "token endpoint unreachable");
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["components"][2]["message"], "token endpoint unreachable");
}

/// Test /health/ready endpoint
#[tokio::test]
async fn test_ready_endpoint() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    assert_eq!(
        server.get("/health/ready").await.status_code(),
        StatusCode::SERVICE_UNAVAILABLE
    );

    ctx.health.store.record(true, "");
    assert_eq!(server.get("/health/ready").await.status_code(), StatusCode::OK);
}

/// Test /health/live endpoint always returns 200 when service is running
#[tokio::test]
async fn test_live_endpoint() {
    let ctx = TestContext::new().await;
    let response = ctx.server().get("/health/live").await;
    assert_eq!(response.status_code(), StatusCode::OK, "Live endpoint should always return 200");
}

/// Test /metrics reflects pipeline activity
#[tokio::test]
async fn test_metrics_endpoint() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let body = fixtures::candidate_webhook("evt-1", "c1", true);
    server
        .post("/v1/tenants/acme/webhooks")
        .add_header("X-Ats-Signature", &fixtures::signature(&body))
        .bytes(body.into())
        .await
        .assert_status(StatusCode::ACCEPTED);

    let response = server.get("/metrics").await;
    response.assert_status_ok();
    let metrics: serde_json::Value = response.json();
    assert_eq!(metrics["webhooks_received"], 1);
    assert_eq!(metrics["enqueued"], 1);
    assert_eq!(metrics["busy_workers"], 0);
    assert!(metrics.get("timestamp").is_some());
}
