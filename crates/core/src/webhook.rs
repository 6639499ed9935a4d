//! Inbound ATS webhook envelope and normalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::candidate::{Candidate, Job, JobState, ProfileSource};
use crate::error::{Error, Result, ValidationErrorCode};
use crate::events::{Contact, Event, EventKind, EventMetadata};
use crate::ids::{CandidateId, JobId, TenantId};

/// Raw webhook body as delivered by the ATS.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope {
    /// External event id, used as the dedup key when present.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub tenant_id: TenantId,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub id: JobId,
    pub title: String,
    #[serde(default)]
    pub state: JobState,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePayload {
    pub id: CandidateId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, flatten)]
    pub profile: ProfileSource,
    /// Absent means "unchanged".
    #[serde(default)]
    pub data_usage_consent: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPayload {
    pub job_id: JobId,
    pub session_id: String,
    #[serde(default)]
    pub candidate_id: Option<CandidateId>,
    #[serde(default)]
    pub contact: Option<Contact>,
}

/// A webhook mapped onto the internal vocabulary.
#[derive(Debug, Clone)]
pub enum NormalizedWebhook {
    Job {
        kind: EventKind,
        job: JobPayload,
    },
    Candidate {
        kind: EventKind,
        candidate: CandidatePayload,
    },
    Application {
        kind: EventKind,
        application: ApplicationPayload,
    },
    /// Event type this pipeline does not act on.
    Ignored(String),
}

fn payload<T: serde::de::DeserializeOwned>(event_type: &str, data: &Value) -> Result<T> {
    serde_json::from_value(data.clone()).map_err(|e| {
        Error::validation_code(
            ValidationErrorCode::InvalidFormat,
            format!("invalid {event_type} payload: {e}"),
        )
    })
}

impl WebhookEnvelope {
    pub fn normalize(&self) -> Result<NormalizedWebhook> {
        let kind = match self.event_type.as_str() {
            "job.created" => EventKind::JobCreated,
            "job.updated" => EventKind::JobUpdated,
            "candidate.created" => EventKind::CandidateCreated,
            "candidate.updated" => EventKind::CandidateUpdated,
            "application.started" | "apply.started" => EventKind::ApplyStarted,
            "application.completed" | "apply.completed" => EventKind::ApplyCompleted,
            other => return Ok(NormalizedWebhook::Ignored(other.to_string())),
        };

        Ok(match kind {
            EventKind::JobCreated | EventKind::JobUpdated => NormalizedWebhook::Job {
                kind,
                job: payload(&self.event_type, &self.data)?,
            },
            EventKind::CandidateCreated | EventKind::CandidateUpdated => NormalizedWebhook::Candidate {
                kind,
                candidate: payload(&self.event_type, &self.data)?,
            },
            _ => NormalizedWebhook::Application {
                kind,
                application: payload(&self.event_type, &self.data)?,
            },
        })
    }
}

impl NormalizedWebhook {
    /// The internal event recorded for this webhook.
    pub fn to_event(&self, tenant_id: &TenantId, timestamp: DateTime<Utc>) -> Result<Option<Event>> {
        let event = match self {
            Self::Job { kind, job } => Event::new(
                *kind,
                tenant_id.clone(),
                job.id.as_str(),
                None,
                timestamp,
                EventMetadata::Job {
                    job_id: job.id.clone(),
                    title: Some(job.title.clone()),
                },
            )?,
            Self::Candidate { kind, candidate } => Event::new(
                *kind,
                tenant_id.clone(),
                candidate.id.as_str(),
                None,
                timestamp,
                EventMetadata::Candidate {
                    candidate_id: candidate.id.clone(),
                    data_usage_consent: candidate.data_usage_consent,
                },
            )?,
            Self::Application { kind, application } => Event::new(
                *kind,
                tenant_id.clone(),
                application
                    .candidate_id
                    .as_ref()
                    .map_or_else(|| application.job_id.to_string(), |c| c.to_string()),
                Some(application.session_id.clone()),
                timestamp,
                EventMetadata::Application {
                    job_id: application.job_id.clone(),
                    candidate_id: application.candidate_id.clone(),
                    contact: application.contact.clone(),
                },
            )?,
            Self::Ignored(_) => return Ok(None),
        };
        Ok(Some(event))
    }
}

impl JobPayload {
    pub fn into_job(self, tenant_id: TenantId, now: DateTime<Utc>) -> Job {
        Job {
            tenant_id,
            id: self.id,
            title: self.title,
            state: self.state,
            updated_at: now,
        }
    }
}

impl CandidatePayload {
    /// Merge onto the stored candidate. Consent stays as it was unless the payload says otherwise.
    pub fn into_candidate(self, tenant_id: TenantId, existing: Option<&Candidate>, now: DateTime<Utc>) -> Candidate {
        let consent = self
            .data_usage_consent
            .or_else(|| existing.map(|c| c.data_usage_consent))
            .unwrap_or(false);
        let profile = if self.profile.is_empty() {
            existing.map(|c| c.profile.clone()).unwrap_or_default()
        } else {
            self.profile
        };
        Candidate {
            tenant_id,
            id: self.id,
            display_name: self.display_name.or_else(|| existing.and_then(|c| c.display_name.clone())),
            email: self.email.or_else(|| existing.and_then(|c| c.email.clone())),
            profile,
            data_usage_consent: consent,
            updated_at: now,
        }
    }

    pub fn withdraws_consent(&self) -> bool {
        self.data_usage_consent == Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event_type: &str, data: Value) -> WebhookEnvelope {
        serde_json::from_value(json!({
            "id": "evt_1",
            "type": event_type,
            "tenantId": "acme",
            "timestamp": "2026-03-01T10:00:00Z",
            "data": data,
        }))
        .unwrap()
    }

    #[test]
    fn test_normalizes_candidate_update() {
        let env = envelope(
            "candidate.updated",
            json!({"id": "c1", "resumeText": "Rust dev", "dataUsageConsent": true}),
        );
        match env.normalize().unwrap() {
            NormalizedWebhook::Candidate { kind, candidate } => {
                assert_eq!(kind, EventKind::CandidateUpdated);
                assert_eq!(candidate.profile.resume_text.as_deref(), Some("Rust dev"));
                assert_eq!(candidate.data_usage_consent, Some(true));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_application_started_maps_to_apply_started() {
        let env = envelope(
            "application.started",
            json!({"jobId": "j1", "sessionId": "s1", "contact": {"email": "a@b.co"}}),
        );
        let normalized = env.normalize().unwrap();
        let event = normalized.to_event(&env.tenant_id, env.timestamp).unwrap().unwrap();
        assert_eq!(event.kind, EventKind::ApplyStarted);
        assert_eq!(event.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let env = envelope("offer.signed", json!({}));
        assert!(matches!(env.normalize().unwrap(), NormalizedWebhook::Ignored(t) if t == "offer.signed"));
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        let env = envelope("job.created", json!({"title": "no id"}));
        assert!(env.normalize().is_err());
    }

    #[test]
    fn test_missing_consent_keeps_existing_flag() {
        let now = Utc::now();
        let tenant = TenantId::parse("acme").unwrap();
        let existing = Candidate {
            tenant_id: tenant.clone(),
            id: CandidateId::parse("c1").unwrap(),
            display_name: Some("Ada".into()),
            email: None,
            profile: ProfileSource {
                resume_text: Some("old".into()),
                ..Default::default()
            },
            data_usage_consent: true,
            updated_at: now,
        };
        let payload: CandidatePayload = serde_json::from_value(json!({"id": "c1"})).unwrap();
        let merged = payload.into_candidate(tenant, Some(&existing), now);
        assert!(merged.data_usage_consent);
        assert_eq!(merged.profile.resume_text.as_deref(), Some("old"));
        assert_eq!(merged.display_name.as_deref(), Some("Ada"));
    }
}
