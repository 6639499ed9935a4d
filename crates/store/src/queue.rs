//! Durable enrichment queue.
//!
//! Dequeue is one critical section: selection and the transition to
//! `processing` happen under the same lock, and the caller walks away with a
//! lease that every later transition must present.

use std::cmp::Reverse;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use pipeline_core::{
    CandidateId, EnqueueMode, EnqueueOutcome, EnrichmentQueueEntry, Error, FailOutcome, FailureDisposition,
    QueueStats, QueueStatus, Result, TenantId,
};
use tracing::{debug, info};
use uuid::Uuid;

/// A failed attempt as reported by a worker.
#[derive(Debug, Clone, Copy)]
pub struct FailureReport<'a> {
    pub error: &'a Error,
    pub disposition: FailureDisposition,
    pub max_retries: u32,
    /// When a retried entry becomes eligible again.
    pub retry_at: DateTime<Utc>,
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Upsert by `(tenant, candidate)`.
    async fn enqueue(
        &self,
        tenant: &TenantId,
        candidate: &CandidateId,
        priority: i32,
        mode: EnqueueMode,
        now: DateTime<Utc>,
    ) -> Result<(EnrichmentQueueEntry, EnqueueOutcome)>;

    /// Highest priority ready entry, oldest first on ties, moved to `processing`.
    async fn dequeue_next(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<EnrichmentQueueEntry>>;

    async fn mark_done(&self, entry_id: Uuid, lease_id: Uuid, now: DateTime<Utc>) -> Result<QueueStatus>;

    async fn mark_failed(
        &self,
        entry_id: Uuid,
        lease_id: Uuid,
        report: FailureReport<'_>,
        now: DateTime<Utc>,
    ) -> Result<FailOutcome>;

    /// Return `processing` entries leased longer than `timeout` to `pending`.
    async fn reclaim_stale(&self, timeout: Duration, now: DateTime<Utc>) -> Result<usize>;

    async fn get_entry(&self, tenant: &TenantId, candidate: &CandidateId) -> Result<Option<EnrichmentQueueEntry>>;

    async fn stats(&self, tenant: &TenantId) -> Result<QueueStats>;
}

type Key = (TenantId, CandidateId);

#[derive(Debug, Default)]
struct QueueState {
    entries: HashMap<Key, EnrichmentQueueEntry>,
    by_id: HashMap<Uuid, Key>,
}

impl QueueState {
    fn entry_mut(&mut self, entry_id: Uuid) -> Result<&mut EnrichmentQueueEntry> {
        let key = self
            .by_id
            .get(&entry_id)
            .ok_or_else(|| Error::not_found("queue_entry", entry_id))?;
        self.entries
            .get_mut(key)
            .ok_or_else(|| Error::store(format!("queue index points at missing entry {entry_id}")))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    state: Mutex<QueueState>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn enqueue(
        &self,
        tenant: &TenantId,
        candidate: &CandidateId,
        priority: i32,
        mode: EnqueueMode,
        now: DateTime<Utc>,
    ) -> Result<(EnrichmentQueueEntry, EnqueueOutcome)> {
        let mut state = self.state.lock();
        let key = (tenant.clone(), candidate.clone());

        if let Some(entry) = state.entries.get_mut(&key) {
            let outcome = entry.apply_enqueue(priority, mode, now);
            debug!(tenant_id = %tenant, candidate_id = %candidate, ?outcome, "Re-enqueued candidate");
            return Ok((entry.clone(), outcome));
        }

        let entry = EnrichmentQueueEntry::new(tenant.clone(), candidate.clone(), priority, now);
        state.by_id.insert(entry.id, key.clone());
        state.entries.insert(key, entry.clone());
        Ok((entry, EnqueueOutcome::Created))
    }

    async fn dequeue_next(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<EnrichmentQueueEntry>> {
        let mut state = self.state.lock();

        let next = state
            .entries
            .iter()
            .filter(|(_, e)| e.is_ready(now))
            .max_by_key(|(_, e)| (e.priority, Reverse(e.created_at), Reverse(e.id)))
            .map(|(key, _)| key.clone());

        let Some(key) = next else {
            return Ok(None);
        };
        let entry = state
            .entries
            .get_mut(&key)
            .ok_or_else(|| Error::store("selected queue entry vanished"))?;
        entry.begin_processing(worker_id, now)?;
        Ok(Some(entry.clone()))
    }

    async fn mark_done(&self, entry_id: Uuid, lease_id: Uuid, now: DateTime<Utc>) -> Result<QueueStatus> {
        let mut state = self.state.lock();
        state.entry_mut(entry_id)?.complete(lease_id, now)
    }

    async fn mark_failed(
        &self,
        entry_id: Uuid,
        lease_id: Uuid,
        report: FailureReport<'_>,
        now: DateTime<Utc>,
    ) -> Result<FailOutcome> {
        let mut state = self.state.lock();
        state.entry_mut(entry_id)?.fail(
            lease_id,
            report.error,
            report.disposition,
            report.max_retries,
            report.retry_at,
            now,
        )
    }

    async fn reclaim_stale(&self, timeout: Duration, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - timeout;
        let mut state = self.state.lock();
        let mut reclaimed = 0;
        for entry in state.entries.values_mut() {
            if entry.is_stale(cutoff) {
                info!(
                    tenant_id = %entry.tenant_id,
                    candidate_id = %entry.candidate_id,
                    worker_id = entry.lease.as_ref().map(|l| l.worker_id.as_str()).unwrap_or("unknown"),
                    "Reclaiming stale queue entry"
                );
                entry.reclaim(now);
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn get_entry(&self, tenant: &TenantId, candidate: &CandidateId) -> Result<Option<EnrichmentQueueEntry>> {
        Ok(self
            .state
            .lock()
            .entries
            .get(&(tenant.clone(), candidate.clone()))
            .cloned())
    }

    async fn stats(&self, tenant: &TenantId) -> Result<QueueStats> {
        let state = self.state.lock();
        let mut stats = QueueStats::default();
        for entry in state.entries.values().filter(|e| &e.tenant_id == tenant) {
            stats.record(entry.status);
        }
        Ok(stats)
    }
}
