//! Access/audit log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{CandidateId, TemplateId, TenantId};
use crate::retention::RetentionPolicy;

/// Why candidate data was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPurpose {
    ScoreRead,
    RecordRead,
}

/// One privileged read of a `CandidateEnrichmentRecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogEntry {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub candidate_id: CandidateId,
    /// Who read the data, as identified by the calling layer.
    pub actor_id: String,
    pub purpose: AccessPurpose,
    #[serde(default)]
    pub template_id: Option<TemplateId>,
    pub accessed_at: DateTime<Utc>,
    /// The entry is kept at least until this instant.
    pub retain_until: DateTime<Utc>,
}

impl AccessLogEntry {
    pub fn new(
        tenant_id: TenantId,
        candidate_id: CandidateId,
        actor_id: impl Into<String>,
        purpose: AccessPurpose,
        template_id: Option<TemplateId>,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            candidate_id,
            actor_id: actor_id.into(),
            purpose,
            template_id,
            accessed_at: now,
            retain_until: now + policy.effective_access_log_retention(),
        }
    }

    pub fn is_purgeable(&self, now: DateTime<Utc>) -> bool {
        self.retain_until <= now
    }
}
