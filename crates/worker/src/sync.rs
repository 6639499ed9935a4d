//! ATS synchronization.
//!
//! Pulls jobs and candidates updated since the tenant's sync cursor, upserts
//! them and queues consenting candidates for enrichment. The cursor only
//! moves after a complete pass, so an interrupted sync is repeated in full.

use std::sync::Arc;
use std::time::Duration;

use ats_client::{AtsApi, ListQuery};
use chrono::{DateTime, Utc};
use pipeline_core::{AuthErrorCode, DeletionReason, EnqueueMode, Error, Result, TenantId};
use pipeline_store::Stores;
use serde::{Deserialize, Serialize};
use telemetry::Metrics;
use tracing::{debug, error, info};

use crate::enrichment::enqueue_candidate;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Run scheduled syncs at all
    pub enabled: bool,
    /// Cadence of scheduled syncs (s)
    pub interval_secs: u64,
    /// Records requested per page
    pub page_size: u32,
    /// Queue priority of synced candidates
    pub priority: i32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 900,
            page_size: 100,
            priority: 0,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub jobs: usize,
    pub candidates: usize,
    pub enqueued: usize,
    pub cursor: Option<DateTime<Utc>>,
}

pub struct SyncService {
    stores: Stores,
    ats: Arc<dyn AtsApi>,
    config: SyncConfig,
    metrics: Arc<Metrics>,
}

impl SyncService {
    pub fn new(stores: Stores, ats: Arc<dyn AtsApi>, config: SyncConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            stores,
            ats,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// One full pass for `tenant`.
    pub async fn sync_tenant(&self, tenant: &TenantId) -> Result<SyncReport> {
        let connection = self.stores.tenants.get_connection(tenant).await?.ok_or_else(|| {
            Error::auth(
                AuthErrorCode::MissingCredentials,
                format!("tenant {tenant} has no ATS connection"),
            )
        })?;
        if !connection.status.is_connected() {
            return Err(Error::auth(
                AuthErrorCode::TenantDisconnected,
                format!("ATS connection for tenant {tenant} is broken"),
            ));
        }

        let started_at = Utc::now();
        let since = connection.last_synced_at;
        let mut report = SyncReport::default();
        self.metrics.sync_runs.inc();

        let mut cursor = None;
        loop {
            let page = self.ats.list_jobs(tenant, &self.query(since, cursor.take())).await?;
            for job in page.items {
                self.stores.candidates.upsert_job(job).await?;
                report.jobs += 1;
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        loop {
            let page = self
                .ats
                .list_candidates(tenant, &self.query(since, cursor.take()))
                .await?;
            for candidate in page.items {
                let id = candidate.id.clone();
                let consenting = candidate.data_usage_consent;
                self.stores.candidates.upsert_candidate(candidate).await?;
                report.candidates += 1;
                if consenting {
                    enqueue_candidate(
                        &self.stores,
                        tenant,
                        &id,
                        self.config.priority,
                        EnqueueMode::Normal,
                        &self.metrics,
                    )
                    .await?;
                    report.enqueued += 1;
                } else {
                    let deleted = self
                        .stores
                        .candidates
                        .logically_delete_enrichment(tenant, &id, DeletionReason::ConsentWithdrawn, Utc::now())
                        .await?;
                    if deleted {
                        info!(tenant_id = %tenant, candidate_id = %id, "Data-usage consent withdrawn in ATS");
                    } else {
                        debug!(tenant_id = %tenant, candidate_id = %id, "No data-usage consent, not queued");
                    }
                }
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        self.stores.tenants.advance_sync_cursor(tenant, started_at).await?;
        report.cursor = Some(started_at);
        info!(
            tenant_id = %tenant,
            jobs = report.jobs,
            candidates = report.candidates,
            enqueued = report.enqueued,
            "ATS sync complete"
        );
        Ok(report)
    }

    /// Sync every active tenant with a working connection.
    pub async fn sync_all(&self) -> Result<usize> {
        let mut synced = 0;
        for tenant in self.stores.tenants.list_tenants().await? {
            if !tenant.active {
                continue;
            }
            let connected = self
                .stores
                .tenants
                .get_connection(&tenant.id)
                .await?
                .is_some_and(|c| c.status.is_connected());
            if !connected {
                continue;
            }
            match self.sync_tenant(&tenant.id).await {
                Ok(_) => synced += 1,
                Err(e) => error!(tenant_id = %tenant.id, code = e.code(), "ATS sync failed: {}", e),
            }
        }
        Ok(synced)
    }

    fn query(&self, since: Option<DateTime<Utc>>, cursor: Option<String>) -> ListQuery {
        ListQuery {
            updated_since: since,
            cursor,
            limit: self.config.page_size,
        }
    }
}
