//! ATS REST payloads.

use chrono::{DateTime, Utc};
use pipeline_core::{Candidate, CandidateId, Job, JobId, JobState, ProfileSource, TenantId};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtsCandidate {
    pub id: CandidateId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, flatten)]
    pub profile: ProfileSource,
    #[serde(default)]
    pub data_usage_consent: bool,
    pub updated_at: DateTime<Utc>,
}

impl AtsCandidate {
    pub fn into_candidate(self, tenant_id: TenantId) -> Candidate {
        Candidate {
            tenant_id,
            id: self.id,
            display_name: self.display_name,
            email: self.email,
            profile: self.profile,
            data_usage_consent: self.data_usage_consent,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtsJob {
    pub id: JobId,
    pub title: String,
    #[serde(default)]
    pub state: JobState,
    pub updated_at: DateTime<Utc>,
}

impl AtsJob {
    pub fn into_job(self, tenant_id: TenantId) -> Job {
        Job {
            tenant_id,
            id: self.id,
            title: self.title,
            state: self.state,
            updated_at: self.updated_at,
        }
    }
}

/// One page of a cursor-paginated list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Parameters of a list call.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Only records updated after this instant.
    pub updated_since: Option<DateTime<Utc>>,
    pub cursor: Option<String>,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRegistrationRequest {
    pub callback_url: Url,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRegistration {
    pub id: String,
    pub callback_url: Url,
    pub events: Vec<String>,
}
