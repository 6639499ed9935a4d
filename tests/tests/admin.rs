//! Tests for the tenant administration surface: templates, sync, queue
//! statistics and explicit enrichment requests.

use std::sync::Arc;

use ats_client::{AtsClient, AtsConfig, TokenManager};
use axum::http::StatusCode;
use integration_tests::{fixtures, mocks::MockTokenExchange, setup::TestContext};
use pipeline_core::{AtsConnection, CandidateId, ConnectionStatus, QueueStatus};
use serde_json::json;
use worker::{SyncConfig, SyncService};

const TEMPLATE_PATH: &str = "/v1/tenants/acme/templates/frontend";

/// A template version that has produced a score is frozen; edits need a
/// version bump.
#[tokio::test]
async fn test_template_version_freezes_after_use() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let created = server.put(TEMPLATE_PATH).json(&fixtures::js_template(1)).await;
    created.assert_status_ok();
    let json: serde_json::Value = created.json();
    assert_eq!(json["id"], "frontend");
    assert_eq!(json["tenantId"], "acme");

    // Unused versions can still be edited in place.
    let mut edited = fixtures::js_template(1);
    edited["name"] = json!("Frontend (draft)");
    server.put(TEMPLATE_PATH).json(&edited).await.assert_status_ok();

    let body = fixtures::candidate_webhook("evt-1", "c1", true);
    server
        .post("/v1/tenants/acme/webhooks")
        .add_header("X-Ats-Signature", &fixtures::signature(&body))
        .bytes(body.into())
        .await
        .assert_status(StatusCode::ACCEPTED);
    ctx.drain_queue().await;

    let score = server
        .get("/v1/tenants/acme/candidates/c1/score")
        .add_query_param("templateId", "frontend")
        .add_header("X-Actor-Id", "recruiter-1")
        .await;
    score.assert_status_ok();
    let json: serde_json::Value = score.json();
    assert_eq!(json["status"], "scored");
    assert_eq!(json["result"]["templateId"], "frontend");
    let weighted = json["result"]["weightedSum"].as_f64().expect("numeric sum");
    assert!((weighted - 50.0).abs() < 1e-6, "weighted sum {weighted}");
    assert_eq!(json["result"]["tier"], "strong");

    let mut reweighted = fixtures::js_template(1);
    reweighted["skillWeights"][0]["weight"] = json!(0.9);
    let conflict = server.put(TEMPLATE_PATH).json(&reweighted).await;
    assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
    let json: serde_json::Value = conflict.json();
    assert_eq!(json["code"], "TPL_001");

    // Turning a frozen version off is allowed.
    let mut deactivated = fixtures::js_template(1);
    deactivated["name"] = json!("Frontend (draft)");
    deactivated["isActive"] = json!(false);
    server.put(TEMPLATE_PATH).json(&deactivated).await.assert_status_ok();

    let mut bumped = reweighted;
    bumped["version"] = json!(2);
    let json: serde_json::Value = server.put(TEMPLATE_PATH).json(&bumped).await.json();
    assert_eq!(json["version"], 2);
}

/// Malformed template bodies are validation errors.
#[tokio::test]
async fn test_invalid_template_is_rejected() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .put(TEMPLATE_PATH)
        .json(&json!({"name": "Frontend", "skillWeights": "lots"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let json: serde_json::Value = response.json();
    assert_eq!(json["code"], "VALID_001");
}

/// Templates for unknown tenants are not found.
#[tokio::test]
async fn test_template_for_unknown_tenant() {
    let ctx = TestContext::new().await;
    let response = ctx
        .server()
        .put("/v1/tenants/globex/templates/frontend")
        .json(&fixtures::js_template(1))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

/// A sync pass pulls every page and queues only consenting candidates.
#[tokio::test]
async fn test_sync_pulls_ats_and_enqueues_consenting_candidates() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    ctx.ats.add_job(fixtures::job("j1"));
    ctx.ats.add_candidate(fixtures::candidate("c1", true));
    ctx.ats.add_candidate(fixtures::candidate("c2", false));
    ctx.ats.add_candidate(fixtures::candidate("c3", true));

    let response = server.post("/v1/tenants/acme/sync").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["jobs"], 1);
    assert_eq!(json["candidates"], 3);
    assert_eq!(json["enqueued"], 2);
    assert!(!json["cursor"].is_null());
    // One job page, two candidate pages.
    assert_eq!(ctx.ats.list_calls(), 3);

    let stats: serde_json::Value = server.get("/v1/tenants/acme/queue").await.json();
    assert_eq!(stats["pending"], 2);
    assert_eq!(stats["failed"], 0);

    assert_eq!(ctx.drain_queue().await, 2);
    let stats: serde_json::Value = server.get("/v1/tenants/acme/queue").await.json();
    assert_eq!(stats["done"], 2);
    assert_eq!(stats["pending"], 0);
}

/// A rejected refresh token disconnects the tenant until it re-authorizes.
#[tokio::test]
async fn test_rejected_refresh_disconnects_tenant() {
    let ctx = TestContext::new().await;
    ctx.stores
        .tenants
        .put_connection(AtsConnection::new(
            fixtures::tenant_id(),
            fixtures::token_set(chrono::Duration::minutes(-5)),
        ))
        .await
        .unwrap();

    let exchange = MockTokenExchange::new();
    exchange.set_reject(true);
    let config = AtsConfig::default();
    let tokens = Arc::new(TokenManager::new(
        ctx.stores.tenants.clone(),
        exchange.clone(),
        config.refresh_margin(),
        ctx.metrics.clone(),
    ));
    let client = AtsClient::new(config, reqwest::Client::new(), tokens, ctx.metrics.clone());
    let sync = SyncService::new(
        ctx.stores.clone(),
        Arc::new(client),
        SyncConfig::default(),
        ctx.metrics.clone(),
    );

    let err = sync.sync_tenant(&fixtures::tenant_id()).await.unwrap_err();
    assert_eq!(err.code(), "AUTH_001");
    assert_eq!(exchange.refreshes(), 1);
    assert_eq!(ctx.metrics.token_refresh_failures.get(), 1);

    let connection = ctx
        .stores
        .tenants
        .get_connection(&fixtures::tenant_id())
        .await
        .unwrap()
        .expect("connection kept");
    assert!(matches!(connection.status, ConnectionStatus::Broken { .. }));

    // No further refresh attempts once broken.
    let err = sync.sync_tenant(&fixtures::tenant_id()).await.unwrap_err();
    assert_eq!(err.code(), "AUTH_001");
    assert_eq!(exchange.refreshes(), 1);

    // The router's sync surfaces the same state.
    let response = ctx.server().post("/v1/tenants/acme/sync").await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let json: serde_json::Value = response.json();
    assert_eq!(json["code"], "AUTH_001");
}

/// Explicit requests use the API priority, only ever raise it, and can
/// revive a failed entry.
#[tokio::test]
async fn test_enrichment_request_priority_and_reset() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    const PATH: &str = "/v1/tenants/acme/candidates/c9/enrichment";

    let response = server.post(PATH).await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "pending");
    assert_eq!(json["priority"], 50);
    assert_eq!(json["candidateId"], "c9");

    let json: serde_json::Value = server.post(PATH).json(&json!({"priority": 70})).await.json();
    assert_eq!(json["priority"], 70);
    let json: serde_json::Value = server.post(PATH).json(&json!({"priority": 10})).await.json();
    assert_eq!(json["priority"], 70);

    // The ATS has no consenting record, so processing fails terminally.
    ctx.ats.add_candidate(fixtures::candidate("c9", false));
    ctx.drain_queue().await;
    let entry = ctx
        .stores
        .queue
        .get_entry(&fixtures::tenant_id(), &CandidateId::parse("c9").unwrap())
        .await
        .unwrap()
        .expect("entry kept");
    assert_eq!(entry.status, QueueStatus::Failed);

    // A normal request leaves the failure alone, a reset revives it.
    let json: serde_json::Value = server.post(PATH).await.json();
    assert_eq!(json["status"], "failed");
    let json: serde_json::Value = server.post(PATH).json(&json!({"reset": true})).await.json();
    assert_eq!(json["status"], "pending");
    assert_eq!(json["retryCount"], 0);
}

/// Unknown fields in an enrichment request are rejected.
#[tokio::test]
async fn test_enrichment_request_rejects_unknown_fields() {
    let ctx = TestContext::new().await;
    let response = ctx
        .server()
        .post("/v1/tenants/acme/candidates/c1/enrichment")
        .json(&json!({"urgency": "high"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let json: serde_json::Value = response.json();
    assert_eq!(json["code"], "VALID_001");
}
