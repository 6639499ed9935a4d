//! Candidate scoring service.
//!
//! Serves `getCandidateScore`: loads the live enrichment record, resolves the
//! requested template (the general template when none is named), runs the
//! injected engine and records the read in the access log. Results are
//! cached by everything they depend on, so a re-enrichment or a new template
//! version simply misses.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use pipeline_core::{
    AccessLogEntry, AccessPurpose, BenchmarkResult, CandidateId, CandidateScore, Error, Result, TemplateId, TenantId,
    GENERAL_TEMPLATE_ID,
};
use pipeline_store::Stores;
use scoring::BenchmarkEngine;
use serde::{Deserialize, Serialize};
use telemetry::Metrics;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreCacheConfig {
    pub max_entries: u64,
    pub ttl_secs: u64,
}

impl Default for ScoreCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_secs: 900,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScoreKey {
    tenant: TenantId,
    candidate: CandidateId,
    template: TemplateId,
    version: u32,
    enriched_at: DateTime<Utc>,
}

pub struct ScoringService {
    stores: Stores,
    engine: BenchmarkEngine,
    cache: Cache<ScoreKey, Arc<BenchmarkResult>>,
    metrics: Arc<Metrics>,
}

impl ScoringService {
    pub fn new(stores: Stores, engine: BenchmarkEngine, config: &ScoreCacheConfig, metrics: Arc<Metrics>) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();
        Self {
            stores,
            engine,
            cache,
            metrics,
        }
    }

    /// Score `candidate` against `template` for `actor`.
    pub async fn candidate_score(
        &self,
        tenant: &TenantId,
        candidate: &CandidateId,
        template: Option<&TemplateId>,
        actor: &str,
    ) -> Result<CandidateScore> {
        let tenant_record = self
            .stores
            .tenants
            .get_tenant(tenant)
            .await?
            .ok_or_else(|| Error::not_found("tenant", tenant))?;

        let record = match self.stores.candidates.get_enrichment(tenant, candidate).await? {
            Some(record) if !record.is_deleted() && !record.is_expired(Utc::now()) => record,
            _ => {
                let queue_status = self
                    .stores
                    .queue
                    .get_entry(tenant, candidate)
                    .await?
                    .map(|entry| entry.status);
                debug!(tenant_id = %tenant, candidate_id = %candidate, "Score requested before enrichment");
                return Ok(CandidateScore::NotYetEnriched { queue_status });
            }
        };

        let template_id = match template {
            Some(id) => id.clone(),
            None => TemplateId::parse(GENERAL_TEMPLATE_ID)?,
        };
        let template = self
            .stores
            .templates
            .get_template(tenant, &template_id)
            .await?
            .filter(|t| t.is_active && t.visible_to(tenant))
            .ok_or_else(|| Error::not_found("template", &template_id))?;

        let key = ScoreKey {
            tenant: tenant.clone(),
            candidate: candidate.clone(),
            template: template.id.clone(),
            version: template.version,
            enriched_at: record.updated_at,
        };
        let result = match self.cache.get(&key).await {
            Some(cached) => {
                self.metrics.score_cache_hits.inc();
                cached
            }
            None => {
                let result = Arc::new(self.engine.evaluate(&record.enrichment, &template));
                self.cache.insert(key, result.clone()).await;
                result
            }
        };

        self.stores.templates.mark_referenced(&template).await?;
        self.stores
            .access_log
            .append(AccessLogEntry::new(
                tenant.clone(),
                candidate.clone(),
                actor,
                AccessPurpose::ScoreRead,
                Some(template.id.clone()),
                &tenant_record.retention,
                Utc::now(),
            ))
            .await?;
        self.metrics.scores_served.inc();

        Ok(CandidateScore::Scored {
            result: (*result).clone(),
        })
    }
}
