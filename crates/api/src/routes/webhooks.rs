//! Webhook ingress endpoint.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use pipeline_core::limits::WEBHOOK_SIGNATURE_HEADER;
use pipeline_core::TenantId;

use crate::response::ApiError;
use crate::state::AppState;
use crate::webhook::WebhookOutcome;

/// POST /v1/tenants/:tenant/webhooks - Signed ATS deliveries.
///
/// 202 when the delivery was applied, 200 for duplicates and ignored types,
/// 401 `HOOK_001` for a bad signature.
pub async fn webhook_handler(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookOutcome>), ApiError> {
    // An unparseable tenant cannot have a secret.
    let tenant = TenantId::parse(tenant)
        .map_err(|_| pipeline_core::Error::InvalidSignature("unknown tenant".into()))?;
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    let outcome = state.webhooks.handle(&tenant, &body, signature).await?;
    let status = match outcome {
        WebhookOutcome::Accepted { .. } => StatusCode::ACCEPTED,
        WebhookOutcome::Duplicate { .. } | WebhookOutcome::Ignored { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}
