//! Tenant administration endpoints: sync, queue statistics, templates.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use pipeline_core::{
    BenchmarkTemplate, Error, ExperienceWeight, QueueStats, ScoringRules, SkillWeight, TemplateId, TenantId,
};
use serde::Deserialize;
use worker::SyncReport;

use crate::extractors::ApiJson;
use crate::response::ApiError;
use crate::state::AppState;

/// Template body for create or update. Timestamps are assigned by the store.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRequest {
    pub name: String,
    #[serde(default = "first_version")]
    pub version: u32,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default = "active")]
    pub is_active: bool,
    #[serde(default)]
    pub skill_weights: Vec<SkillWeight>,
    #[serde(default)]
    pub experience_weights: Vec<ExperienceWeight>,
    #[serde(default)]
    pub scoring_rules: ScoringRules,
}

fn first_version() -> u32 {
    1
}

fn active() -> bool {
    true
}

/// POST /v1/tenants/:tenant/sync - Run one ATS sync pass now.
pub async fn sync_handler(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<SyncReport>, ApiError> {
    let tenant = TenantId::parse(tenant)?;
    let report = state.sync.sync_tenant(&tenant).await?;
    Ok(Json(report))
}

/// GET /v1/tenants/:tenant/queue - Enrichment queue counts by status.
pub async fn queue_stats_handler(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<QueueStats>, ApiError> {
    let tenant = TenantId::parse(tenant)?;
    Ok(Json(state.stores.queue.stats(&tenant).await?))
}

/// PUT /v1/tenants/:tenant/templates/:template - Create or update a template.
///
/// A version referenced by a completed score only accepts activation
/// changes; anything else needs a version bump (409 `TPL_001`).
pub async fn put_template_handler(
    State(state): State<AppState>,
    Path((tenant, template)): Path<(String, String)>,
    ApiJson(request): ApiJson<TemplateRequest>,
) -> Result<Json<BenchmarkTemplate>, ApiError> {
    let tenant = TenantId::parse(tenant)?;
    let id = TemplateId::parse(template)?;
    if state.stores.tenants.get_tenant(&tenant).await?.is_none() {
        return Err(Error::not_found("tenant", &tenant).into());
    }

    let now = Utc::now();
    let template = BenchmarkTemplate {
        id,
        tenant_id: Some(tenant.clone()),
        name: request.name,
        version: request.version,
        is_public: request.is_public,
        is_active: request.is_active,
        skill_weights: request.skill_weights,
        experience_weights: request.experience_weights,
        scoring_rules: request.scoring_rules,
        created_at: now,
        updated_at: now,
    };
    let stored = state.stores.templates.put_template(&tenant, template, now).await?;
    Ok(Json(stored))
}
