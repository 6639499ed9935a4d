//! Append-only access/audit log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pipeline_core::{AccessLogEntry, CandidateId, Result, TenantId};

#[async_trait]
pub trait AccessLog: Send + Sync {
    async fn append(&self, entry: AccessLogEntry) -> Result<()>;

    /// Reads of one candidate's data, oldest first.
    async fn list(&self, tenant: &TenantId, candidate: &CandidateId) -> Result<Vec<AccessLogEntry>>;

    /// Drop entries whose own retention window has passed. Returns the count.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

#[derive(Debug, Default)]
pub struct InMemoryAccessLog {
    entries: RwLock<Vec<AccessLogEntry>>,
}

impl InMemoryAccessLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessLog for InMemoryAccessLog {
    async fn append(&self, entry: AccessLogEntry) -> Result<()> {
        self.entries.write().push(entry);
        Ok(())
    }

    async fn list(&self, tenant: &TenantId, candidate: &CandidateId) -> Result<Vec<AccessLogEntry>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| &e.tenant_id == tenant && &e.candidate_id == candidate)
            .cloned()
            .collect())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| !e.is_purgeable(now));
        Ok(before - entries.len())
    }
}
