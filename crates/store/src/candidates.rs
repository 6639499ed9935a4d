//! Candidates, jobs and enrichment records.
//!
//! Every key is `(tenant, id)`; a lookup with the wrong tenant simply finds
//! nothing.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pipeline_core::{
    Candidate, CandidateEnrichmentRecord, CandidateId, DeletionReason, Job, JobId, Result, TenantId,
};

#[async_trait]
pub trait CandidateStore: Send + Sync {
    async fn get_candidate(&self, tenant: &TenantId, id: &CandidateId) -> Result<Option<Candidate>>;

    async fn upsert_candidate(&self, candidate: Candidate) -> Result<()>;

    async fn get_job(&self, tenant: &TenantId, id: &JobId) -> Result<Option<Job>>;

    async fn upsert_job(&self, job: Job) -> Result<()>;

    /// Enrichment record, including logically deleted ones.
    async fn get_enrichment(&self, tenant: &TenantId, id: &CandidateId) -> Result<Option<CandidateEnrichmentRecord>>;

    /// Insert or replace by `(candidateId, tenantId)`.
    async fn upsert_enrichment(&self, record: CandidateEnrichmentRecord) -> Result<()>;

    /// Upsert only if the candidate still consents and consent was not
    /// withdrawn on the stored record since `started`. Returns whether the
    /// record was written.
    async fn upsert_enrichment_if_consented(
        &self,
        record: CandidateEnrichmentRecord,
        started: DateTime<Utc>,
    ) -> Result<bool>;

    /// Returns whether a live record was deleted.
    async fn logically_delete_enrichment(
        &self,
        tenant: &TenantId,
        id: &CandidateId,
        reason: DeletionReason,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Logically delete every record past its retention date. Returns the count.
    async fn expire_enrichments(&self, now: DateTime<Utc>) -> Result<usize>;
}

type Key<I> = (TenantId, I);

#[derive(Debug, Default)]
pub struct InMemoryCandidateStore {
    candidates: RwLock<HashMap<Key<CandidateId>, Candidate>>,
    jobs: RwLock<HashMap<Key<JobId>, Job>>,
    enrichments: RwLock<HashMap<Key<CandidateId>, CandidateEnrichmentRecord>>,
}

impl InMemoryCandidateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CandidateStore for InMemoryCandidateStore {
    async fn get_candidate(&self, tenant: &TenantId, id: &CandidateId) -> Result<Option<Candidate>> {
        Ok(self
            .candidates
            .read()
            .get(&(tenant.clone(), id.clone()))
            .cloned())
    }

    async fn upsert_candidate(&self, candidate: Candidate) -> Result<()> {
        let key = (candidate.tenant_id.clone(), candidate.id.clone());
        self.candidates.write().insert(key, candidate);
        Ok(())
    }

    async fn get_job(&self, tenant: &TenantId, id: &JobId) -> Result<Option<Job>> {
        Ok(self.jobs.read().get(&(tenant.clone(), id.clone())).cloned())
    }

    async fn upsert_job(&self, job: Job) -> Result<()> {
        let key = (job.tenant_id.clone(), job.id.clone());
        self.jobs.write().insert(key, job);
        Ok(())
    }

    async fn get_enrichment(&self, tenant: &TenantId, id: &CandidateId) -> Result<Option<CandidateEnrichmentRecord>> {
        Ok(self
            .enrichments
            .read()
            .get(&(tenant.clone(), id.clone()))
            .cloned())
    }

    async fn upsert_enrichment(&self, record: CandidateEnrichmentRecord) -> Result<()> {
        let key = (record.tenant_id.clone(), record.candidate_id.clone());
        self.enrichments.write().insert(key, record);
        Ok(())
    }

    async fn upsert_enrichment_if_consented(
        &self,
        record: CandidateEnrichmentRecord,
        started: DateTime<Utc>,
    ) -> Result<bool> {
        let key = (record.tenant_id.clone(), record.candidate_id.clone());
        // Candidates before enrichments, held together so a withdrawal
        // cannot land between the check and the write.
        let candidates = self.candidates.read();
        let mut enrichments = self.enrichments.write();

        let consenting = candidates.get(&key).is_some_and(|c| c.data_usage_consent);
        let withdrawn = enrichments
            .get(&key)
            .is_some_and(|existing| existing.consent_withdrawn_since(started));
        if !consenting || withdrawn || !record.data_usage_consent {
            return Ok(false);
        }
        enrichments.insert(key, record);
        Ok(true)
    }

    async fn logically_delete_enrichment(
        &self,
        tenant: &TenantId,
        id: &CandidateId,
        reason: DeletionReason,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut enrichments = self.enrichments.write();
        match enrichments.get_mut(&(tenant.clone(), id.clone())) {
            Some(record) if !record.is_deleted() => {
                record.logically_delete(reason, now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_enrichments(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut expired = 0;
        for record in self.enrichments.write().values_mut() {
            if !record.is_deleted() && record.is_expired(now) {
                record.logically_delete(DeletionReason::RetentionExpired, now);
                expired += 1;
            }
        }
        Ok(expired)
    }
}
