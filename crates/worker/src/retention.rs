//! Retention worker.
//!
//! Enrichment records past their retention date are logically deleted.
//! Access-log entries are purged only once their own, longer window has
//! passed. Expired sweep locks left by crashed holders are dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pipeline_core::Result;
use pipeline_store::Stores;
use serde::{Deserialize, Serialize};
use telemetry::Metrics;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Sweep cadence (s)
    pub interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { interval_secs: 3_600 }
    }
}

impl RetentionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub records_expired: usize,
    pub access_entries_purged: usize,
    pub locks_expired: usize,
}

pub struct RetentionWorker {
    stores: Stores,
    metrics: Arc<Metrics>,
}

impl RetentionWorker {
    pub fn new(stores: Stores, metrics: Arc<Metrics>) -> Self {
        Self { stores, metrics }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<RetentionReport> {
        let report = RetentionReport {
            records_expired: self.stores.candidates.expire_enrichments(now).await?,
            access_entries_purged: self.stores.access_log.purge_expired(now).await?,
            locks_expired: self.stores.locks.expire(now).await?,
        };

        self.metrics.records_expired.add(report.records_expired as u64);
        self.metrics.access_entries_purged.add(report.access_entries_purged as u64);

        if report == RetentionReport::default() {
            debug!("Retention sweep found nothing to do");
        } else {
            info!(
                records_expired = report.records_expired,
                access_entries_purged = report.access_entries_purged,
                locks_expired = report.locks_expired,
                "Retention sweep complete"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pipeline_core::{
        AccessLogEntry, AccessPurpose, CandidateEnrichmentRecord, CandidateId, DeletionReason, RetentionPolicy,
        StructuredEnrichment, TenantId,
    };

    fn tenant() -> TenantId {
        TenantId::parse("acme").unwrap()
    }

    #[tokio::test]
    async fn test_expired_records_are_logically_deleted() {
        let stores = Stores::in_memory();
        let worker = RetentionWorker::new(stores.clone(), Arc::new(Metrics::new()));
        let now = Utc::now();
        let policy = RetentionPolicy::default();

        let old = CandidateId::parse("old").unwrap();
        let fresh = CandidateId::parse("fresh").unwrap();
        for (id, created) in [(&old, now - Duration::days(400)), (&fresh, now)] {
            stores
                .candidates
                .upsert_enrichment(CandidateEnrichmentRecord::new(
                    tenant(),
                    id.clone(),
                    StructuredEnrichment::default(),
                    policy.retention_date_from(created),
                    created,
                ))
                .await
                .unwrap();
        }
        for accessed_days_ago in [200, 400] {
            stores
                .access_log
                .append(AccessLogEntry::new(
                    tenant(),
                    old.clone(),
                    "recruiter-1",
                    AccessPurpose::RecordRead,
                    None,
                    &policy,
                    now - Duration::days(accessed_days_ago),
                ))
                .await
                .unwrap();
        }

        let report = worker.run(now).await.unwrap();
        assert_eq!(report.records_expired, 1);
        // Only the entry past its own, longer window goes.
        assert_eq!(report.access_entries_purged, 1);
        assert_eq!(stores.access_log.list(&tenant(), &old).await.unwrap().len(), 1);

        let record = stores.candidates.get_enrichment(&tenant(), &old).await.unwrap().unwrap();
        assert_eq!(record.deletion_reason, Some(DeletionReason::RetentionExpired));
        assert!(!stores.candidates.get_enrichment(&tenant(), &fresh).await.unwrap().unwrap().is_deleted());

        // A second pass is a no-op.
        assert_eq!(worker.run(now).await.unwrap(), RetentionReport::default());
    }
}
