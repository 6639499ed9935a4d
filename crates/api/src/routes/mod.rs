//! API routes.

pub mod admin;
pub mod candidates;
pub mod health;
pub mod webhooks;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/tenants/:tenant/webhooks", post(webhooks::webhook_handler))
        .route(
            "/v1/tenants/:tenant/candidates/:candidate/score",
            get(candidates::score_handler),
        )
        .route(
            "/v1/tenants/:tenant/candidates/:candidate/enrichment",
            post(candidates::enqueue_handler),
        )
        .route("/v1/tenants/:tenant/sync", post(admin::sync_handler))
        .route("/v1/tenants/:tenant/queue", get(admin::queue_stats_handler))
        .route(
            "/v1/tenants/:tenant/templates/:template",
            put(admin::put_template_handler),
        )
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .route("/health/live", get(health::live_handler))
        .route("/metrics", get(health::metrics_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
