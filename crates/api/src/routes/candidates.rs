//! Candidate scoring and enrichment endpoints.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use pipeline_core::limits::clamp_priority;
use pipeline_core::{CandidateId, CandidateScore, EnqueueMode, TemplateId, TenantId};
use serde::Deserialize;
use tracing::info;
use worker::enqueue_candidate;

use crate::extractors::ActorId;
use crate::response::{ApiError, EnqueueResponse};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreQuery {
    #[serde(default)]
    pub template_id: Option<String>,
}

/// Body of an enrichment request. Both fields are optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnqueueRequest {
    #[serde(default)]
    pub priority: Option<i32>,
    /// Revive a terminally failed entry.
    #[serde(default)]
    pub reset: bool,
}

/// GET /v1/tenants/:tenant/candidates/:candidate/score?templateId=
pub async fn score_handler(
    State(state): State<AppState>,
    Path((tenant, candidate)): Path<(String, String)>,
    Query(query): Query<ScoreQuery>,
    ActorId(actor): ActorId,
) -> Result<Json<CandidateScore>, ApiError> {
    let tenant = TenantId::parse(tenant)?;
    let candidate = CandidateId::parse(candidate)?;
    let template = query.template_id.map(TemplateId::parse).transpose()?;

    let score = state
        .scores
        .candidate_score(&tenant, &candidate, template.as_ref(), &actor)
        .await?;
    Ok(Json(score))
}

/// POST /v1/tenants/:tenant/candidates/:candidate/enrichment
pub async fn enqueue_handler(
    State(state): State<AppState>,
    Path((tenant, candidate)): Path<(String, String)>,
    body: Bytes,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    let tenant = TenantId::parse(tenant)?;
    let candidate = CandidateId::parse(candidate)?;
    let request: EnqueueRequest = if body.iter().all(u8::is_ascii_whitespace) {
        EnqueueRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(pipeline_core::Error::from)?
    };

    if state.stores.tenants.get_tenant(&tenant).await?.is_none() {
        return Err(pipeline_core::Error::not_found("tenant", &tenant).into());
    }

    let priority = clamp_priority(request.priority.unwrap_or(state.queue.api_priority));
    let mode = if request.reset {
        EnqueueMode::Reset
    } else {
        EnqueueMode::Normal
    };
    let entry = enqueue_candidate(&state.stores, &tenant, &candidate, priority, mode, &state.metrics).await?;

    info!(
        tenant_id = %tenant,
        candidate_id = %candidate,
        priority = entry.priority,
        status = ?entry.status,
        "Enrichment requested"
    );
    Ok((StatusCode::ACCEPTED, Json(entry.into())))
}
